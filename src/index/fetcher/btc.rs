use super::super::{BlockData, BlockSource, InscriptionData, LogData, OutputData, TxData};
use crate::{
  config::ChainConfig,
  protocol::resolver::{btc::is_primary_inscription, is_supported_mime},
  rpc::{ord::InscriptionInfo, BtcClient, OrdClient},
  Result,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bitcoin::{Address, Network, Transaction};
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;

/// Utxo-chain block source: blocks from the node, inscriptions from the
/// ordinal enumerator.
pub struct BtcFetcher {
  client: BtcClient,
  ord: OrdClient,
  network: Network,
  workers: usize,
}

impl BtcFetcher {
  pub fn new(chain: &ChainConfig, workers: usize) -> Result<Self> {
    Ok(Self {
      client: BtcClient::new(&chain.rpc, &chain.username, &chain.password)?,
      ord: OrdClient::new(&chain.ord_rpc)?,
      network: if chain.testnet {
        Network::Testnet
      } else {
        Network::Bitcoin
      },
      workers: workers.max(1),
    })
  }

  /// Primary inscriptions revealed in block `height`, keyed by reveal txid.
  async fn inscriptions(&self, height: u64) -> Result<HashMap<String, InscriptionData>> {
    let mut ids = Vec::new();
    let mut page = 0;
    loop {
      let inscriptions = self
        .ord
        .block_inscriptions(height, page)
        .await
        .with_context(|| format!("failed to list inscriptions of block {height}"))?;
      ids.extend(
        inscriptions
          .inscriptions
          .into_iter()
          .filter(|id| is_primary_inscription(id)),
      );
      if !inscriptions.more {
        break;
      }
      page += 1;
    }

    let ord = &self.ord;
    stream::iter(ids.into_iter().map(|id| async move {
      let info = ord
        .inscription(&id)
        .await
        .with_context(|| format!("failed to fetch inscription {id}"))?;
      let content = match &info.content_type {
        Some(mime) if !is_supported_mime(mime) => Vec::new(),
        _ => ord
          .content(&id)
          .await
          .with_context(|| format!("failed to fetch content of {id}"))?,
      };
      let txid = reveal_txid(&id).to_string();
      let (location, offset) = reveal_location(&txid, &info);
      Ok::<_, anyhow::Error>((
        txid,
        InscriptionData {
          id,
          content_type: info.content_type,
          content,
          location,
          offset,
        },
      ))
    }))
    .buffered(self.workers)
    .try_collect()
    .await
  }
}

fn reveal_txid(id: &str) -> &str {
  id.rsplit_once('i').map(|(txid, _)| txid).unwrap_or(id)
}

/// Where the inscribed sat sat right after the reveal. A satpoint that has
/// since moved to another transaction falls back to the first output.
fn reveal_location(txid: &str, info: &InscriptionInfo) -> (String, u64) {
  match info.location() {
    Some((outpoint, offset)) if outpoint.starts_with(txid) => (outpoint, offset),
    _ => (format!("{txid}:0"), 0),
  }
}

fn vout(location: &str) -> Option<usize> {
  location.rsplit_once(':')?.1.parse().ok()
}

fn tx_data(
  tx: &Transaction,
  index: usize,
  network: Network,
  inscriptions: &mut HashMap<String, InscriptionData>,
) -> TxData {
  let hash = tx.txid().to_string();
  let inputs = if tx.is_coin_base() {
    Vec::new()
  } else {
    tx.input
      .iter()
      .map(|input| input.previous_output.to_string())
      .collect()
  };
  let outputs = tx
    .output
    .iter()
    .map(|output| OutputData {
      address: Address::from_script(&output.script_pubkey, network)
        .ok()
        .map(|address| address.to_string()),
      value: output.value,
    })
    .collect::<Vec<OutputData>>();

  let inscription = inscriptions.remove(&hash);
  let owner = match &inscription {
    Some(inscription) => vout(&inscription.location)
      .and_then(|vout| outputs.get(vout))
      .and_then(|output| output.address.clone()),
    None => outputs.iter().find_map(|output| output.address.clone()),
  }
  .unwrap_or_default();

  TxData {
    hash,
    index: u32::try_from(index).unwrap_or(u32::MAX),
    from: owner.clone(),
    to: Some(owner),
    inputs,
    outputs,
    inscription,
    ..Default::default()
  }
}

#[async_trait]
impl BlockSource for BtcFetcher {
  async fn chain_id(&self) -> Result<u64> {
    Ok(0)
  }

  /// Capped at ord's height so blocks are never scanned before ord has indexed them.
  async fn latest(&self) -> Result<u64> {
    let (node, ord) = tokio::try_join!(
      async { Ok::<_, anyhow::Error>(self.client.block_count().await?) },
      async {
        self
          .ord
          .block_height()
          .await
          .context("failed to read ord block height")
      }
    )?;
    Ok(node.min(ord))
  }

  async fn block(&self, number: u64) -> Result<BlockData> {
    let hash = self.client.block_hash(number).await?;
    let (block, mut inscriptions) =
      tokio::try_join!(
        async { Ok::<_, anyhow::Error>(self.client.block(hash).await?) },
        self.inscriptions(number)
      )?;

    let txs = block
      .txdata
      .iter()
      .enumerate()
      .map(|(index, tx)| tx_data(tx, index, self.network, &mut inscriptions))
      .collect();
    if !inscriptions.is_empty() {
      log::warn!(
        "{} inscriptions of block {number} have no reveal transaction",
        inscriptions.len()
      );
    }

    Ok(BlockData {
      number,
      hash: hash.to_string(),
      time: block.header.time,
      txs,
    })
  }

  async fn logs(&self, _from: u64, _to: u64) -> Result<HashMap<String, Vec<LogData>>> {
    Ok(HashMap::new())
  }

  async fn enrich(&self, tx: TxData) -> Result<Option<TxData>> {
    Ok(Some(tx))
  }

  async fn input_values(&self, outpoints: &[String]) -> Result<Vec<u64>> {
    let ord = &self.ord;
    let futures = outpoints
      .iter()
      .map(|outpoint| async move {
      let (txid, vout) = outpoint
        .split_once(':')
        .and_then(|(txid, vout)| Some((txid, vout.parse::<u32>().ok()?)))
        .ok_or_else(|| anyhow!("invalid outpoint {outpoint}"))?;
      let output = ord
        .output(txid, vout)
        .await
        .with_context(|| format!("failed to fetch output {outpoint}"))?;
      Ok::<_, anyhow::Error>(output.value)
    })
      .collect::<Vec<_>>();
    stream::iter(futures)
    .buffered(self.workers)
    .try_collect()
    .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bitcoin::{
    absolute::LockTime, hashes::Hash, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness,
  };

  fn info(satpoint: &str) -> InscriptionInfo {
    InscriptionInfo {
      satpoint: satpoint.to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn test_reveal_location() {
    let txid = "ab".repeat(32);
    assert_eq!(reveal_txid(&format!("{txid}i0")), txid);
    assert_eq!(
      reveal_location(&txid, &info(&format!("{txid}:1:500"))),
      (format!("{txid}:1"), 500)
    );
    assert_eq!(
      reveal_location(&txid, &info(&format!("{}:0:0", "cd".repeat(32)))),
      (format!("{txid}:0"), 0)
    );
    assert_eq!(reveal_location(&txid, &info("")), (format!("{txid}:0"), 0));
  }

  #[test]
  fn test_tx_data_owner_is_inscribed_output() {
    let owner = ScriptBuf::new_v0_p2wpkh(&bitcoin::WPubkeyHash::all_zeros());
    let tx = Transaction {
      version: 2,
      lock_time: LockTime::ZERO,
      input: vec![TxIn {
        previous_output: OutPoint::new(Txid::all_zeros(), 1),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
      }],
      output: vec![
        TxOut {
          value: 1000,
          script_pubkey: ScriptBuf::new(),
        },
        TxOut {
          value: 546,
          script_pubkey: owner.clone(),
        },
      ],
    };
    let txid = tx.txid().to_string();
    let mut inscriptions = HashMap::from([(
      txid.clone(),
      InscriptionData {
        id: format!("{txid}i0"),
        location: format!("{txid}:1"),
        ..Default::default()
      },
    )]);

    let data = tx_data(&tx, 4, Network::Bitcoin, &mut inscriptions);
    let address = Address::from_script(&owner, Network::Bitcoin)
      .unwrap()
      .to_string();
    assert!(inscriptions.is_empty());
    assert_eq!(data.index, 4);
    assert_eq!(data.from, address);
    assert_eq!(data.to, Some(address.clone()));
    assert_eq!(data.inputs, vec![format!("{}:1", Txid::all_zeros())]);
    assert_eq!(data.outputs[0].address, None);
    assert_eq!(data.outputs[1].address, Some(address));
    assert_eq!(data.inscription.unwrap().id, format!("{txid}i0"));
  }
}
