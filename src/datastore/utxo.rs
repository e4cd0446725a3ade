use super::{Entity, EntityKind, TickKey};
use crate::protocol::Num;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoStatus {
  Unspent,
  Spent,
}

impl UtxoStatus {
  pub fn code(&self) -> i64 {
    match self {
      Self::Unspent => 0,
      Self::Spent => 1,
    }
  }

  pub fn from_code(code: i64) -> Self {
    if code == 0 {
      Self::Unspent
    } else {
      Self::Spent
    }
  }
}

/// Inscribed-but-not-yet-moved transfer of a utxo-mode tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferUtxo {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  /// Inscription id assigned by the chain.
  pub sn: String,
  pub address: String,
  pub amount: Num,
  pub status: UtxoStatus,
  /// `txid:vout` currently holding the inscription.
  pub location: String,
  /// Sat offset of the inscription inside `location`.
  pub offset: u64,
}

impl TransferUtxo {
  pub fn tick_key(&self) -> TickKey {
    TickKey::new(&self.protocol, &self.tick)
  }
}

impl Entity for TransferUtxo {
  type Key = String;
  const KIND: EntityKind = EntityKind::Utxo;

  fn key(&self) -> Self::Key {
    self.sn.clone()
  }

  fn sid(&self) -> u64 {
    self.sid
  }

  fn set_sid(&mut self, sid: u64) {
    self.sid = sid;
  }
}
