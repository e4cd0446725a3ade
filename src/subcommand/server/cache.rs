use serde_json::Value;
use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard},
  time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

struct Entry {
  value: Value,
  expires: Instant,
}

#[derive(Default)]
struct Entries {
  map: HashMap<String, Entry>,
  /// Approximate size of `map`, from stringified keys and values.
  size: usize,
}

fn entry_size(key: &str, value: &Value) -> usize {
  key.len() + value.to_string().len()
}

/// Response memo of the read API. Entries expire after `ttl`; inserts are
/// refused while the approximate size is over `capacity` bytes.
pub(crate) struct TtlCache {
  ttl: Duration,
  capacity: usize,
  entries: Mutex<Entries>,
}

impl TtlCache {
  pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
    Self {
      ttl,
      capacity,
      entries: Mutex::new(Entries::default()),
    }
  }

  fn entries(&self) -> MutexGuard<'_, Entries> {
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub(crate) fn get(&self, key: &str) -> Option<Value> {
    self
      .entries()
      .map
      .get(key)
      .filter(|entry| entry.expires > Instant::now())
      .map(|entry| entry.value.clone())
  }

  /// Returns false when the cache is over budget.
  pub(crate) fn insert(&self, key: String, value: Value) -> bool {
    let mut entries = self.entries();
    if entries.size >= self.capacity {
      return false;
    }
    entries.size += entry_size(&key, &value);
    entries.map.insert(
      key,
      Entry {
        value,
        expires: Instant::now() + self.ttl,
      },
    );
    true
  }

  /// Drops expired entries and recomputes the size. Returns the number of
  /// entries removed.
  pub(crate) fn sweep(&self) -> usize {
    let now = Instant::now();
    let mut entries = self.entries();
    let before = entries.map.len();
    entries.map.retain(|_, entry| entry.expires > now);
    entries.size = entries
      .map
      .iter()
      .map(|(key, entry)| entry_size(key, &entry.value))
      .sum();
    before - entries.map.len()
  }

  pub(crate) fn size(&self) -> usize {
    self.entries().size
  }
}

pub(crate) async fn run_sweeper(cache: Arc<TtlCache>, cancel: CancellationToken) {
  let mut interval = tokio::time::interval(SWEEP_INTERVAL);
  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = interval.tick() => {
        let removed = cache.sweep();
        if removed > 0 {
          log::debug!("swept {removed} expired responses, {} bytes cached", cache.size());
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_get_before_and_after_expiry() {
    let cache = TtlCache::new(Duration::from_millis(50), 1024);
    assert!(cache.insert("getStatus:null".to_string(), json!({"number": 1})));
    assert_eq!(cache.get("getStatus:null"), Some(json!({"number": 1})));
    assert_eq!(cache.get("missing"), None);

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(cache.get("getStatus:null"), None);
    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.size(), 0);
  }

  #[test]
  fn test_refuses_inserts_over_budget() {
    let cache = TtlCache::new(Duration::from_secs(60), 16);
    assert!(cache.insert("a".to_string(), json!("0123456789abcdef")));
    assert!(cache.size() >= 16);
    assert!(!cache.insert("b".to_string(), json!(1)));
    assert_eq!(cache.get("b"), None);
    assert_eq!(cache.get("a"), Some(json!("0123456789abcdef")));
  }

  #[test]
  fn test_sweep_recomputes_size() {
    let cache = TtlCache::new(Duration::from_secs(60), 1024);
    cache.insert("k".to_string(), json!([1, 2, 3]));
    cache.insert("k".to_string(), json!([1, 2, 3]));
    assert_eq!(cache.size(), 2 * entry_size("k", &json!([1, 2, 3])));
    assert_eq!(cache.sweep(), 0);
    assert_eq!(cache.size(), entry_size("k", &json!([1, 2, 3])));
  }
}
