use super::{BlockData, BlockSource, ChainStatus, IndexOptions};
use crate::Result;
use futures::{stream, StreamExt, TryStreamExt};
use std::{
  collections::BTreeMap,
  sync::Arc,
  time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lag above which blocks are fetched in batches.
const BACKFILL_LAG: u64 = 500;
/// Lag above which the tip tracker stops polling.
const TRACKER_PAUSE_LAG: u64 = 100;
const TIP_INTERVAL: Duration = Duration::from_secs(1);
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Polls the node for its latest block number.
pub(super) async fn track_tip(
  source: Arc<dyn BlockSource>,
  status: Arc<ChainStatus>,
  cancel: CancellationToken,
) -> Result {
  let mut interval = tokio::time::interval(TIP_INTERVAL);
  loop {
    tokio::select! {
      _ = cancel.cancelled() => return Ok(()),
      _ = interval.tick() => {}
    }

    let tip = status.tip();
    if tip != 0 && tip.saturating_sub(status.scanned()) > TRACKER_PAUSE_LAG {
      continue;
    }
    match source.latest().await {
      Ok(latest) => {
        if latest != tip {
          log::debug!("chain tip {latest}");
        }
        status.set_tip(latest);
      }
      Err(e) => log::warn!("failed to fetch latest block: {e:#}"),
    }
  }
}

/// Emits blocks in strictly ascending order, never above `tip - delay`.
pub(super) struct Scanner {
  source: Arc<dyn BlockSource>,
  status: Arc<ChainStatus>,
  scan_limit: u64,
  delay: u64,
  workers: usize,
  profile: bool,
}

impl Scanner {
  pub(super) fn new(
    source: Arc<dyn BlockSource>,
    status: Arc<ChainStatus>,
    options: &IndexOptions,
  ) -> Self {
    Self {
      source,
      status,
      scan_limit: options.scan_limit,
      delay: options.delay,
      workers: options.workers,
      profile: options.profile,
    }
  }

  /// Last block number that may be emitted, if any.
  fn safe_height(&self) -> Option<u64> {
    let tip = self.status.tip();
    if tip == 0 {
      return None;
    }
    tip.checked_sub(self.delay)
  }

  /// Blocks to fetch next: a batch while far behind, else one.
  fn next_range(&self, next: u64, safe: u64) -> (u64, u64) {
    let lag = safe - next + 1;
    let count = if lag > BACKFILL_LAG {
      self.scan_limit.min(lag)
    } else {
      1
    };
    (next, next + count)
  }

  pub(super) async fn run(
    self,
    start: u64,
    blocks: mpsc::Sender<BlockData>,
    cancel: CancellationToken,
  ) -> Result {
    let mut next = start;
    loop {
      let wait = match self.safe_height() {
        Some(safe) if next <= safe => {
          let (from, to) = self.next_range(next, safe);
          match self.fetch_range(from, to).await {
            Ok(fetched) => {
              for block in fetched {
                let number = block.number;
                tokio::select! {
                  _ = cancel.cancelled() => return Ok(()),
                  sent = blocks.send(block) => if sent.is_err() {
                    return Ok(());
                  },
                }
                self.status.set_scanned(number);
              }
              next = to;
              None
            }
            Err(e) => {
              log::warn!("failed to fetch blocks [{from}, {to}): {e:#}");
              Some(RETRY_INTERVAL)
            }
          }
        }
        _ => Some(TIP_INTERVAL),
      };

      if let Some(wait) = wait {
        tokio::select! {
          _ = cancel.cancelled() => return Ok(()),
          _ = tokio::time::sleep(wait) => {}
        }
      } else if cancel.is_cancelled() {
        return Ok(());
      }
    }
  }

  /// Fetches blocks `[from, to)` concurrently together with their logs and
  /// returns them in order.
  pub(super) async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<BlockData>> {
    let start = Instant::now();
    let source = &self.source;

    let blocks = stream::iter(from..to)
      .map(|number| async move { source.block(number).await })
      .buffer_unordered(self.workers)
      .try_fold(BTreeMap::new(), |mut blocks, block| async move {
        blocks.insert(block.number, block);
        Ok(blocks)
      });
    let (blocks, mut logs) = tokio::try_join!(blocks, source.logs(from, to))?;

    let blocks = blocks
      .into_values()
      .map(|mut block| {
        for tx in &mut block.txs {
          if let Some(mut tx_logs) = logs.remove(&tx.hash) {
            tx_logs.sort_by_key(|log| log.log_index);
            tx.logs = tx_logs;
          }
        }
        block
      })
      .collect::<Vec<_>>();

    if blocks.len() != (from..to).count() {
      anyhow::bail!("expected {} blocks, got {}", to - from, blocks.len());
    }
    if self.profile {
      log::info!(
        "fetched blocks [{from}, {to}) in {} ms",
        start.elapsed().as_millis()
      );
    }
    Ok(blocks)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    index::{
      tests::{block, evm_tx, MockSource},
      Filter, LogData,
    },
    protocol::ChainGroup,
  };
  use pretty_assertions::assert_eq;

  fn scanner(source: MockSource, delay: u64, scan_limit: u64) -> Scanner {
    Scanner::new(
      Arc::new(source),
      Arc::new(ChainStatus::starting_at(1)),
      &IndexOptions {
        chain: "avalanche".to_string(),
        group: ChainGroup::Evm,
        from_block: 1,
        scan_limit,
        delay,
        workers: 4,
        profile: false,
        filter: Filter::default(),
      },
    )
  }

  #[test]
  fn test_next_range() {
    let scanner = scanner(MockSource::default(), 0, 10);
    assert_eq!(scanner.next_range(1, 100), (1, 2));
    assert_eq!(scanner.next_range(1, 500), (1, 2));
    assert_eq!(scanner.next_range(1, 501), (1, 11));
    assert_eq!(scanner.next_range(1, 2000), (1, 11));
  }

  #[test]
  fn test_safe_height() {
    let scanner = scanner(MockSource::default(), 3, 2);
    assert_eq!(scanner.safe_height(), None);
    scanner.status.set_tip(2);
    assert_eq!(scanner.safe_height(), None);
    scanner.status.set_tip(10);
    assert_eq!(scanner.safe_height(), Some(7));
  }

  #[tokio::test]
  async fn test_fetch_range_in_order_with_logs() {
    let source = MockSource::with_blocks(
      (1..=6)
        .map(|n| block(n, vec![evm_tx(n as u32, "0xaaaa", "0xbbbb", "{}")]))
        .collect(),
    );
    let hash = evm_tx(3, "", "", "").hash;
    source.logs.lock().unwrap().insert(
      hash.clone(),
      vec![
        LogData {
          log_index: 2,
          ..Default::default()
        },
        LogData {
          log_index: 1,
          ..Default::default()
        },
      ],
    );

    let scanner = scanner(source, 0, 10);
    let blocks = scanner.fetch_range(1, 7).await.unwrap();
    assert_eq!(
      blocks.iter().map(|b| b.number).collect::<Vec<_>>(),
      vec![1, 2, 3, 4, 5, 6]
    );
    assert_eq!(
      blocks[2].txs[0]
        .logs
        .iter()
        .map(|log| log.log_index)
        .collect::<Vec<_>>(),
      vec![1, 2]
    );
    assert!(blocks[0].txs[0].logs.is_empty());

    assert!(scanner.fetch_range(5, 9).await.is_err());
  }

  #[tokio::test]
  async fn test_run_respects_delay() {
    let source = MockSource::with_blocks((1..=5).map(|n| block(n, Vec::new())).collect());
    let scanner = scanner(source, 2, 2);
    scanner.status.set_tip(5);
    let status = scanner.status.clone();

    let (block_tx, mut block_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scanner.run(1, block_tx, cancel.clone()));

    let mut numbers = Vec::new();
    for _ in 0..3 {
      numbers.push(block_rx.recv().await.unwrap().number);
    }
    assert_eq!(numbers, vec![1, 2, 3]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(block_rx.try_recv().is_err());
    assert_eq!(status.scanned(), 3);

    cancel.cancel();
    task.await.unwrap().unwrap();
  }
}
