use super::{Entity, EntityKind, TickKey};
use crate::protocol::Num;
use serde::{Deserialize, Serialize};

/// Holding of one address in one tick. `available` excludes amounts
/// inscribed for transfer and not yet moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub address: String,
  pub overall: Num,
  pub available: Num,
}

impl Balance {
  pub fn new(chain: &str, tick: &TickKey, address: &str) -> Self {
    Self {
      sid: 0,
      chain: chain.to_string(),
      protocol: tick.protocol.clone(),
      tick: tick.tick.clone(),
      address: address.to_string(),
      overall: Num::zero(),
      available: Num::zero(),
    }
  }

  /// Amount locked in unspent transfer inscriptions.
  pub fn transferable(&self) -> Result<Num, crate::protocol::NumError> {
    self.overall.checked_sub(&self.available)
  }
}

impl Entity for Balance {
  type Key = (TickKey, String);
  const KIND: EntityKind = EntityKind::Balance;

  fn key(&self) -> Self::Key {
    (TickKey::new(&self.protocol, &self.tick), self.address.clone())
  }

  fn sid(&self) -> u64 {
    self.sid
  }

  fn set_sid(&mut self, sid: u64) {
    self.sid = sid;
  }
}
