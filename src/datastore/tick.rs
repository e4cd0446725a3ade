use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use web3::signing::keccak256;

/// Business key of a deployed tick: protocol and tick, trimmed and
/// case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TickKey {
  pub protocol: String,
  pub tick: String,
}

impl TickKey {
  pub fn new(protocol: &str, tick: &str) -> Self {
    Self {
      protocol: protocol.trim().to_lowercase(),
      tick: tick.trim().to_lowercase(),
    }
  }

  /// Key of the tick-name index used by log events that carry an indexed
  /// (hashed) ticker.
  pub fn name_hash(&self) -> [u8; 32] {
    keccak256(self.tick.as_bytes())
  }
}

impl Display for TickKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.protocol, self.tick)
  }
}
