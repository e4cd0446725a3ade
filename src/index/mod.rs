use crate::{
  cache::Cache,
  config::Config,
  datastore::{ChainInfo, StorageReadWrite},
  protocol::ChainGroup,
  Result,
};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use web3::types::H256;

mod builder;
pub mod fetcher;
mod flusher;
mod scanner;
mod updater;

pub(crate) use self::{builder::BatchBuilder, updater::Filter};

/// Blocks buffered between the scanner and the indexing loop.
const BLOCK_CHANNEL_SIZE: usize = 1024;
/// Block deltas buffered between the indexing loop and the flusher.
const DELTA_CHANNEL_SIZE: usize = 10240;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogData {
  pub address: String,
  pub topics: Vec<H256>,
  pub data: Vec<u8>,
  pub log_index: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputData {
  /// `None` when the script has no address form.
  pub address: Option<String>,
  pub value: u64,
}

/// Primary inscription revealed by a utxo-chain transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InscriptionData {
  pub id: String,
  pub content_type: Option<String>,
  pub content: Vec<u8>,
  /// `txid:vout`
  pub location: String,
  pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxData {
  pub hash: String,
  pub index: u32,
  pub from: String,
  pub to: Option<String>,
  /// Hex call data of account-chain transactions.
  pub input: String,
  pub gas_price: u128,
  pub gas_used: u128,
  pub logs: Vec<LogData>,
  /// Spent outpoints (`txid:vout`) of utxo-chain transactions.
  pub inputs: Vec<String>,
  pub outputs: Vec<OutputData>,
  pub inscription: Option<InscriptionData>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockData {
  pub number: u64,
  pub hash: String,
  pub time: u32,
  pub txs: Vec<TxData>,
}

/// Node access the pipeline needs, one implementation per chain group.
#[async_trait]
pub trait BlockSource: Send + Sync {
  async fn chain_id(&self) -> Result<u64>;

  async fn latest(&self) -> Result<u64>;

  async fn block(&self, number: u64) -> Result<BlockData>;

  /// Allowlisted logs of blocks `[from, to)`, grouped by transaction hash.
  async fn logs(&self, from: u64, to: u64) -> Result<HashMap<String, Vec<LogData>>>;

  /// Completes a transaction that survived filtering; `None` drops it.
  async fn enrich(&self, tx: TxData) -> Result<Option<TxData>>;

  /// Values of the given outpoints, in order.
  async fn input_values(&self, outpoints: &[String]) -> Result<Vec<u64>>;
}

/// Heights reached by each stage of the pipeline.
#[derive(Debug, Default)]
pub struct ChainStatus {
  tip: AtomicU64,
  scanned: AtomicU64,
  indexed: AtomicU64,
  flushed: AtomicU64,
}

impl ChainStatus {
  pub fn starting_at(number: u64) -> Self {
    let previous = number.saturating_sub(1);
    Self {
      tip: AtomicU64::new(0),
      scanned: AtomicU64::new(previous),
      indexed: AtomicU64::new(previous),
      flushed: AtomicU64::new(previous),
    }
  }

  pub fn tip(&self) -> u64 {
    self.tip.load(Ordering::Acquire)
  }

  pub fn set_tip(&self, number: u64) {
    self.tip.store(number, Ordering::Release);
  }

  pub fn scanned(&self) -> u64 {
    self.scanned.load(Ordering::Acquire)
  }

  pub fn set_scanned(&self, number: u64) {
    self.scanned.store(number, Ordering::Release);
  }

  pub fn indexed(&self) -> u64 {
    self.indexed.load(Ordering::Acquire)
  }

  pub fn set_indexed(&self, number: u64) {
    self.indexed.store(number, Ordering::Release);
  }

  pub fn flushed(&self) -> u64 {
    self.flushed.load(Ordering::Acquire)
  }

  pub fn set_flushed(&self, number: u64) {
    self.flushed.store(number, Ordering::Release);
  }
}

/// Settings of one indexing run, taken from the config.
#[derive(Debug, Clone)]
pub struct IndexOptions {
  pub chain: String,
  pub group: ChainGroup,
  pub from_block: u64,
  pub scan_limit: u64,
  pub delay: u64,
  pub workers: usize,
  pub profile: bool,
  pub filter: Filter,
}

impl IndexOptions {
  pub fn new(config: &Config) -> Result<Self> {
    Ok(Self {
      chain: config.chain.chain_name.clone(),
      group: config.chain.chain_group,
      from_block: config.server.from_block,
      scan_limit: config.server.scan_limit.max(1),
      delay: config.server.delayed_scan_number,
      workers: config.server.batch_workers.max(1),
      profile: config.profile_enabled,
      filter: Filter::new(&config.filters)?,
    })
  }
}

fn holder_id(chain: &str) -> String {
  format!("{chain}:{}", std::process::id())
}

fn spawn_task<F>(name: &'static str, cancel: &CancellationToken, task: F) -> JoinHandle<Result>
where
  F: std::future::Future<Output = Result> + Send + 'static,
{
  let cancel = cancel.clone();
  tokio::spawn(async move {
    let result = task.await;
    match &result {
      Ok(()) => log::info!("{name} stopped"),
      Err(e) => {
        log::error!("{name} failed: {e:#}");
        cancel.cancel();
      }
    }
    result
  })
}

/// Runs scanner, tip tracker, indexing loop and flusher until `cancel`
/// fires or one of them fails.
pub async fn run<S>(
  options: IndexOptions,
  source: Arc<dyn BlockSource>,
  storage: Arc<S>,
  cancel: CancellationToken,
) -> Result
where
  S: StorageReadWrite + Send + Sync + 'static,
{
  let holder = holder_id(&options.chain);
  if !storage
    .acquire_lock(&holder)
    .map_err(|e| anyhow!("failed to acquire global lock: {e}"))?
  {
    bail!("global lock is held by another indexer");
  }
  log::info!("global lock acquired by {holder}");

  let result = run_locked(&options, source, storage.clone(), &holder, cancel).await;

  if let Err(e) = storage.release_lock(&holder) {
    log::warn!("failed to release global lock: {e}");
  }
  result
}

async fn run_locked<S>(
  options: &IndexOptions,
  source: Arc<dyn BlockSource>,
  storage: Arc<S>,
  holder: &str,
  cancel: CancellationToken,
) -> Result
where
  S: StorageReadWrite + Send + Sync + 'static,
{
  let chain = options.chain.as_str();
  let chain_id = source.chain_id().await.context("failed to fetch chain id")?;
  storage
    .save_chain_info(&ChainInfo {
      chain: chain.to_string(),
      chain_id,
      chain_group: options.group.as_str().to_string(),
    })
    .map_err(|e| anyhow!("failed to save chain info: {e}"))?;

  let start = match storage
    .get_checkpoint(chain)
    .map_err(|e| anyhow!("failed to read checkpoint: {e}"))?
  {
    Some(checkpoint) => checkpoint.number + 1,
    None => options.from_block,
  };
  log::info!("indexing {chain} ({}) from block {start}", options.group.as_str());

  let cache = {
    let storage = storage.clone();
    let chain = chain.to_string();
    Arc::new(tokio::task::spawn_blocking(move || Cache::load(&chain, storage.as_ref())).await??)
  };
  let status = Arc::new(ChainStatus::starting_at(start));

  let (block_tx, block_rx) = mpsc::channel(BLOCK_CHANNEL_SIZE);
  let (delta_tx, delta_rx) = mpsc::channel(DELTA_CHANNEL_SIZE);

  let tracker = spawn_task(
    "tip tracker",
    &cancel,
    scanner::track_tip(source.clone(), status.clone(), cancel.clone()),
  );
  let scanner = spawn_task(
    "scanner",
    &cancel,
    scanner::Scanner::new(source.clone(), status.clone(), options).run(
      start,
      block_tx,
      cancel.clone(),
    ),
  );
  let updater = spawn_task(
    "indexing loop",
    &cancel,
    updater::Updater::new(source, cache, status.clone(), options).run(
      start,
      block_rx,
      delta_tx,
      cancel.clone(),
    ),
  );
  let flusher = spawn_task(
    "flusher",
    &cancel,
    flusher::Flusher::new(storage, status, chain, holder, options.profile).run(
      delta_rx,
      cancel.clone(),
    ),
  );

  let (tracker, scanner, updater, flusher) = tokio::join!(tracker, scanner, updater, flusher);
  tracker??;
  scanner??;
  updater??;
  flusher??;
  Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Mutex;

  /// In-memory chain serving prepared blocks.
  #[derive(Debug, Default)]
  pub(crate) struct MockSource {
    pub(crate) blocks: Mutex<Vec<BlockData>>,
    pub(crate) logs: Mutex<HashMap<String, Vec<LogData>>>,
    pub(crate) failed: Mutex<Vec<String>>,
    pub(crate) values: Mutex<HashMap<String, u64>>,
  }

  impl MockSource {
    pub(crate) fn with_blocks(blocks: Vec<BlockData>) -> Self {
      Self {
        blocks: Mutex::new(blocks),
        ..Default::default()
      }
    }
  }

  #[async_trait]
  impl BlockSource for MockSource {
    async fn chain_id(&self) -> Result<u64> {
      Ok(43114)
    }

    async fn latest(&self) -> Result<u64> {
      Ok(
        self
          .blocks
          .lock()
          .unwrap()
          .iter()
          .map(|block| block.number)
          .max()
          .unwrap_or_default(),
      )
    }

    async fn block(&self, number: u64) -> Result<BlockData> {
      self
        .blocks
        .lock()
        .unwrap()
        .iter()
        .find(|block| block.number == number)
        .cloned()
        .ok_or_else(|| anyhow!("block {number} not found"))
    }

    async fn logs(&self, from: u64, to: u64) -> Result<HashMap<String, Vec<LogData>>> {
      let hashes = self
        .blocks
        .lock()
        .unwrap()
        .iter()
        .filter(|block| (from..to).contains(&block.number))
        .flat_map(|block| block.txs.iter().map(|tx| tx.hash.clone()))
        .collect::<Vec<_>>();
      let logs = self.logs.lock().unwrap();
      Ok(
        hashes
          .into_iter()
          .filter_map(|hash| logs.get(&hash).map(|logs| (hash, logs.clone())))
          .collect(),
      )
    }

    async fn enrich(&self, tx: TxData) -> Result<Option<TxData>> {
      if self.failed.lock().unwrap().contains(&tx.hash) {
        return Ok(None);
      }
      Ok(Some(tx))
    }

    async fn input_values(&self, outpoints: &[String]) -> Result<Vec<u64>> {
      let values = self.values.lock().unwrap();
      outpoints
        .iter()
        .map(|outpoint| {
          values
            .get(outpoint)
            .copied()
            .ok_or_else(|| anyhow!("unknown output {outpoint}"))
        })
        .collect()
    }
  }

  pub(crate) fn data_input(json: &str) -> String {
    format!("0x{}", hex::encode(format!("data:,{json}")))
  }

  pub(crate) fn evm_tx(index: u32, from: &str, to: &str, json: &str) -> TxData {
    TxData {
      hash: format!("0x{index:064x}"),
      index,
      from: from.to_string(),
      to: Some(to.to_string()),
      input: data_input(json),
      gas_price: 25_000_000_000,
      gas_used: 21_000,
      ..Default::default()
    }
  }

  pub(crate) fn block(number: u64, txs: Vec<TxData>) -> BlockData {
    BlockData {
      number,
      hash: format!("0x{number:064x}"),
      time: 1_700_000_000 + number as u32,
      txs,
    }
  }

  #[test]
  fn test_status_starts_before_first_block() {
    let status = ChainStatus::starting_at(100);
    assert_eq!(status.indexed(), 99);
    assert_eq!(status.flushed(), 99);
    assert_eq!(status.tip(), 0);
    status.set_tip(120);
    assert_eq!(status.tip(), 120);
    assert_eq!(ChainStatus::starting_at(0).scanned(), 0);
  }
}
