use super::{BatchBuilder, ChainStatus};
use crate::{
  datastore::{BlockDelta, FlushBatch, StorageReadWrite},
  Result,
};
use anyhow::{anyhow, bail};
use std::{
  sync::Arc,
  time::{Duration, Instant},
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// Block deltas drained per flush.
const MAX_DELTAS_PER_FLUSH: usize = 100;

/// Periodically writes drained block deltas in one transaction.
pub(super) struct Flusher<S> {
  storage: Arc<S>,
  status: Arc<ChainStatus>,
  chain: String,
  holder: String,
  profile: bool,
  /// A batch whose write failed, retried before anything new is drained.
  pending: Option<FlushBatch>,
}

impl<S> Flusher<S>
where
  S: StorageReadWrite + Send + Sync + 'static,
{
  pub(super) fn new(
    storage: Arc<S>,
    status: Arc<ChainStatus>,
    chain: &str,
    holder: &str,
    profile: bool,
  ) -> Self {
    Self {
      storage,
      status,
      chain: chain.to_string(),
      holder: holder.to_string(),
      profile,
      pending: None,
    }
  }

  pub(super) async fn run(
    mut self,
    mut deltas: mpsc::Receiver<BlockDelta>,
    cancel: CancellationToken,
  ) -> Result {
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = interval.tick() => {}
      }
      self.refresh_lock()?;
      if self.pending.is_none() {
        self.pending = Self::drain(&self.chain, &mut deltas, MAX_DELTAS_PER_FLUSH);
      }
      self.flush().await?;
    }

    // final flush of everything already indexed
    self.flush().await?;
    if self.pending.is_some() {
      bail!("unflushed batch left at shutdown");
    }
    deltas.close();
    if let Some(batch) = Self::drain(&self.chain, &mut deltas, usize::MAX) {
      self.pending = Some(batch);
      self.flush().await?;
      if self.pending.is_some() {
        bail!("unflushed batch left at shutdown");
      }
    }
    log::info!("flusher stopped at block {}", self.status.flushed());
    Ok(())
  }

  fn refresh_lock(&self) -> Result {
    let held = self
      .storage
      .refresh_lock(&self.holder)
      .map_err(|e| anyhow!("failed to refresh global lock: {e}"))?;
    if !held {
      bail!("global lock lost by {}", self.holder);
    }
    Ok(())
  }

  fn drain(
    chain: &str,
    deltas: &mut mpsc::Receiver<BlockDelta>,
    limit: usize,
  ) -> Option<FlushBatch> {
    let mut builder = BatchBuilder::new(chain);
    while builder.blocks() < limit {
      match deltas.try_recv() {
        Ok(delta) => builder.push(&delta),
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
    }
    (builder.blocks() > 0).then(|| builder.build())
  }

  /// Writes the pending batch. A failed write keeps it for the next tick.
  async fn flush(&mut self) -> Result {
    let Some(batch) = self.pending.take() else {
      return Ok(());
    };
    let start = Instant::now();
    let storage = self.storage.clone();
    let (batch, result) = tokio::task::spawn_blocking(move || {
      let result = storage.flush(&batch).map_err(|e| anyhow!("{e}"));
      (batch, result)
    })
    .await?;

    match result {
      Ok(()) => {
        if let Some(checkpoint) = &batch.checkpoint {
          self.status.set_flushed(checkpoint.number);
          if self.profile {
            log::info!(
              "flushed {} txs up to block {} in {} ms",
              batch.txs.len(),
              checkpoint.number,
              start.elapsed().as_millis()
            );
          } else {
            log::debug!("flushed up to block {}", checkpoint.number);
          }
        }
      }
      Err(e) => {
        log::error!("flush failed, retrying on next tick: {e:#}");
        self.pending = Some(batch);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    cache::Cache,
    datastore::{sqlite::SqliteStorage, StorageReadOnly},
    protocol::{
      execute,
      test::{inscribe, mock_context, mock_tx, CHAIN},
      ChainGroup,
    },
  };

  fn deltas(cache: &Cache, numbers: std::ops::RangeInclusive<u64>) -> Vec<BlockDelta> {
    numbers
      .map(|number| {
        let context = mock_context(ChainGroup::Evm, number);
        let mut state = cache.block_state();
        let msg = if number == 1 {
          inscribe(r#"{"p":"asc-20","op":"deploy","tick":"test","max":"100000","lim":"100"}"#)
        } else {
          inscribe(r#"{"p":"asc-20","op":"mint","tick":"test","amt":"1"}"#)
        };
        let tx = mock_tx(number as u8, "0xcccc", "0xdddd");
        let mut events = Vec::new();
        if let Some(mut event) = execute(&context, &tx, &state, &msg).unwrap() {
          state.apply(&mut event).unwrap();
          events.push(event);
        }
        state.commit().unwrap();
        BlockDelta {
          block: context,
          events,
        }
      })
      .collect()
  }

  #[test]
  fn test_drain_limit() {
    let cache = Cache::new(CHAIN);
    let (tx, mut rx) = mpsc::channel(256);
    for delta in deltas(&cache, 1..=150) {
      tx.try_send(delta).unwrap();
    }

    let first = Flusher::<SqliteStorage>::drain(CHAIN, &mut rx, MAX_DELTAS_PER_FLUSH).unwrap();
    assert_eq!(first.checkpoint.unwrap().number, 100);
    let second = Flusher::<SqliteStorage>::drain(CHAIN, &mut rx, MAX_DELTAS_PER_FLUSH).unwrap();
    assert_eq!(second.checkpoint.unwrap().number, 150);
    assert!(Flusher::<SqliteStorage>::drain(CHAIN, &mut rx, MAX_DELTAS_PER_FLUSH).is_none());
  }

  #[tokio::test]
  async fn test_run_flushes_on_shutdown() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    assert!(storage.acquire_lock("me").unwrap());
    let status = Arc::new(ChainStatus::starting_at(1));
    let cache = Cache::new(CHAIN);

    let (tx, rx) = mpsc::channel(16);
    for delta in deltas(&cache, 1..=3) {
      tx.send(delta).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let flusher = Flusher::new(storage.clone(), status.clone(), CHAIN, "me", true);
    let task = tokio::spawn(flusher.run(rx, cancel.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(status.flushed(), 3);

    for delta in deltas(&cache, 4..=5) {
      tx.send(delta).await.unwrap();
    }
    cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(status.flushed(), 5);
    assert_eq!(storage.get_checkpoint(CHAIN).unwrap().unwrap().number, 5);
    let stats = storage
      .get_stats(CHAIN, &crate::datastore::TickKey::new("asc-20", "test"))
      .unwrap()
      .unwrap();
    assert_eq!(stats.tx_cnt, 5);
  }

  #[tokio::test]
  async fn test_lost_lock_is_fatal() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let (_tx, rx) = mpsc::channel(1);
    let flusher = Flusher::new(
      storage,
      Arc::new(ChainStatus::default()),
      CHAIN,
      "me",
      false,
    );
    assert!(flusher.run(rx, CancellationToken::new()).await.is_err());
  }
}
