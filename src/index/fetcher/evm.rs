use super::super::{BlockData, BlockSource, LogData, TxData};
use crate::{
  config::{ChainConfig, FiltersConfig},
  protocol::resolver::exchange,
  rpc::EvmClient,
  Result,
};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::{collections::HashMap, str::FromStr};
use web3::types::{Block, Log, Transaction, H256, U64};

/// Account-chain block source.
pub struct EvmFetcher {
  client: EvmClient,
  topics: Vec<H256>,
}

impl EvmFetcher {
  pub fn new(chain: &ChainConfig, filters: &FiltersConfig) -> Result<Self> {
    Ok(Self {
      client: EvmClient::new(&chain.rpc, &chain.username, &chain.password)?,
      topics: parse_topics(&filters.event_topics)?,
    })
  }
}

/// Configured backfill topics, or the exchange topics when none are set.
fn parse_topics(topics: &[String]) -> Result<Vec<H256>> {
  if topics.is_empty() {
    return Ok(exchange::default_topics());
  }
  topics
    .iter()
    .map(|topic| {
      H256::from_str(topic.trim().trim_start_matches("0x"))
        .map_err(|e| anyhow!("invalid event topic {topic}: {e}"))
    })
    .collect()
}

fn tx_data(tx: Transaction) -> TxData {
  TxData {
    hash: format!("{:?}", tx.hash),
    index: tx
      .transaction_index
      .map(|index| index.low_u32())
      .unwrap_or_default(),
    from: tx.from.map(|from| format!("{from:?}")).unwrap_or_default(),
    to: tx.to.map(|to| format!("{to:?}")),
    input: format!("0x{}", hex::encode(&tx.input.0)),
    gas_price: tx.gas_price.unwrap_or_default().low_u128(),
    ..Default::default()
  }
}

fn block_data(block: Block<Transaction>) -> Result<BlockData> {
  let number = block
    .number
    .ok_or_else(|| anyhow!("block has no number"))?
    .as_u64();
  let Some(hash) = block.hash else {
    bail!("block {number} has no hash");
  };
  Ok(BlockData {
    number,
    hash: format!("{hash:?}"),
    time: block.timestamp.low_u32(),
    txs: block.transactions.into_iter().map(tx_data).collect(),
  })
}

fn group_logs(logs: Vec<Log>) -> HashMap<String, Vec<LogData>> {
  let mut grouped = HashMap::<String, Vec<LogData>>::new();
  for log in logs {
    if log.removed == Some(true) {
      continue;
    }
    let Some(hash) = log.transaction_hash else {
      continue;
    };
    grouped
      .entry(format!("{hash:?}"))
      .or_default()
      .push(LogData {
        address: format!("{:?}", log.address),
        topics: log.topics,
        data: log.data.0,
        log_index: log.log_index.map(|i| i.low_u64()).unwrap_or_default(),
      });
  }
  grouped
}

#[async_trait]
impl BlockSource for EvmFetcher {
  async fn chain_id(&self) -> Result<u64> {
    Ok(self.client.chain_id().await?)
  }

  async fn latest(&self) -> Result<u64> {
    Ok(self.client.block_number().await?)
  }

  async fn block(&self, number: u64) -> Result<BlockData> {
    block_data(self.client.block_with_txs(number).await?)
  }

  async fn logs(&self, from: u64, to: u64) -> Result<HashMap<String, Vec<LogData>>> {
    if from >= to {
      return Ok(HashMap::new());
    }
    Ok(group_logs(self.client.logs(from, to, &self.topics).await?))
  }

  async fn enrich(&self, mut tx: TxData) -> Result<Option<TxData>> {
    let receipt = self.client.receipt(&tx.hash).await?;
    if receipt.status != Some(U64::from(1)) {
      log::debug!("tx {} failed, dropped", tx.hash);
      return Ok(None);
    }
    if let Some(price) = receipt.effective_gas_price.filter(|price| !price.is_zero()) {
      tx.gas_price = price.low_u128();
    }
    if let Some(used) = receipt.gas_used.filter(|used| !used.is_zero()) {
      tx.gas_used = used.low_u128();
    }
    Ok(Some(tx))
  }

  async fn input_values(&self, _outpoints: &[String]) -> Result<Vec<u64>> {
    bail!("account chains have no outpoints")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use web3::types::{Bytes, H160, U256};

  #[test]
  fn test_parse_topics() {
    assert_eq!(parse_topics(&[]).unwrap(), exchange::default_topics());
    let topic = format!("0x{}", "ab".repeat(32));
    assert_eq!(
      parse_topics(&[topic]).unwrap(),
      vec![H256::repeat_byte(0xab)]
    );
    assert!(parse_topics(&["0x1234".to_string()]).is_err());
  }

  #[test]
  fn test_tx_data() {
    let tx = Transaction {
      hash: H256::repeat_byte(1),
      transaction_index: Some(U64::from(3)),
      from: Some(H160::repeat_byte(0xaa)),
      to: None,
      input: Bytes(b"data:,{}".to_vec()),
      gas_price: Some(U256::from(25)),
      ..Default::default()
    };
    let data = tx_data(tx);
    assert_eq!(data.hash, format!("0x{}", "01".repeat(32)));
    assert_eq!(data.index, 3);
    assert_eq!(data.from, format!("0x{}", "aa".repeat(20)));
    assert_eq!(data.to, None);
    assert_eq!(data.input, "0x646174613a2c7b7d");
    assert_eq!(data.gas_price, 25);
  }

  #[test]
  fn test_group_logs() {
    let log = |tx: u8, index: u64, removed: Option<bool>| Log {
      address: H160::repeat_byte(0xcc),
      topics: vec![H256::repeat_byte(9)],
      data: Bytes(vec![1, 2]),
      block_hash: None,
      block_number: None,
      transaction_hash: Some(H256::repeat_byte(tx)),
      transaction_index: None,
      log_index: Some(U256::from(index)),
      transaction_log_index: None,
      log_type: None,
      removed,
    };
    let grouped = group_logs(vec![
      log(1, 0, None),
      log(2, 1, Some(false)),
      log(1, 2, None),
      log(1, 3, Some(true)),
    ]);
    assert_eq!(grouped.len(), 2);
    let first = &grouped[&format!("0x{}", "01".repeat(32))];
    assert_eq!(
      first.iter().map(|log| log.log_index).collect::<Vec<_>>(),
      vec![0, 2]
    );
    assert_eq!(first[0].address, format!("0x{}", "cc".repeat(20)));
  }
}
