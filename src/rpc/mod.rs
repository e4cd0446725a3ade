use std::{future::Future, time::Duration};

pub mod btc;
pub mod evm;
pub mod ord;

pub use self::{btc::BtcClient, evm::EvmClient, ord::OrdClient};

/// Deadline of one node call.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: usize = 10;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);
const UNFINALIZED_SENTINEL: &str = "cannot query unfinalized data";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
  #[error("no result")]
  NoResult,

  #[error("cannot query unfinalized data")]
  Unfinalized,

  #[error("request timed out after {0:?}")]
  Timeout(Duration),

  #[error("transport error: {0}")]
  Transport(String),
}

impl RpcError {
  /// Permanent errors are not retried.
  pub fn is_permanent(&self) -> bool {
    matches!(self, Self::NoResult | Self::Unfinalized)
  }

  pub(crate) fn classify(message: String) -> Self {
    if message.contains(UNFINALIZED_SENTINEL) {
      Self::Unfinalized
    } else {
      Self::Transport(message)
    }
  }
}

/// Runs `call` under the call deadline, retrying transient failures.
pub(crate) async fn with_retry<T, F, Fut>(method: &str, mut call: F) -> Result<T, RpcError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, RpcError>>,
{
  let mut attempt = 0;
  loop {
    attempt += 1;
    let result = match tokio::time::timeout(CALL_TIMEOUT, call()).await {
      Ok(result) => result,
      Err(_) => Err(RpcError::Timeout(CALL_TIMEOUT)),
    };
    match result {
      Ok(value) => return Ok(value),
      Err(e) if e.is_permanent() || attempt >= MAX_ATTEMPTS => return Err(e),
      Err(e) => {
        log::warn!("{method} failed (attempt {attempt}/{MAX_ATTEMPTS}): {e}");
        tokio::time::sleep(RETRY_BACKOFF).await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test]
  async fn test_transient_errors_are_retried() {
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let value = with_retry("test", move || async move {
      if counter.fetch_add(1, Ordering::SeqCst) < 2 {
        Err(RpcError::Transport("connection reset".to_string()))
      } else {
        Ok(7)
      }
    })
    .await
    .unwrap();
    assert_eq!(value, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_permanent_errors_short_circuit() {
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let result: Result<(), _> = with_retry("test", move || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Err(RpcError::classify(
        "cannot query unfinalized data".to_string(),
      ))
    })
    .await;
    assert_eq!(result, Err(RpcError::Unfinalized));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_gives_up_after_max_attempts() {
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let result: Result<(), _> = with_retry("test", move || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Err(RpcError::Transport("down".to_string()))
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
  }
}
