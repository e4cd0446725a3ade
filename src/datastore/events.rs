use super::{Balance, Entity, Inscription, InscriptionStats, TickKey, TransferUtxo};
use crate::protocol::{BlockContext, Num, TxRef};
use serde::{Deserialize, Serialize};
use std::{
  fmt::{Display, Formatter},
  str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
  Deploy,
  Mint,
  Transfer,
  List,
  Exchange,
  InscribeTransfer,
}

impl OperationType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Deploy => "deploy",
      Self::Mint => "mint",
      Self::Transfer => "transfer",
      Self::List => "list",
      Self::Exchange => "exchange",
      Self::InscribeTransfer => "inscribeTransfer",
    }
  }
}

impl Display for OperationType {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OperationType {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "deploy" => Self::Deploy,
      "mint" => Self::Mint,
      "transfer" => Self::Transfer,
      "list" => Self::List,
      "exchange" => Self::Exchange,
      "inscribeTransfer" => Self::InscribeTransfer,
      other => anyhow::bail!("unknown operation {other}"),
    })
  }
}

/// Copy of a row taken when an event is emitted. `created` is true when
/// the row did not exist before the event.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
  pub row: T,
  pub created: bool,
}

impl<T: Entity> From<T> for Snapshot<T> {
  fn from(row: T) -> Self {
    Self {
      created: row.sid() == 0,
      row,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
  Deploy {
    inscription: Snapshot<Inscription>,
    stats: Snapshot<InscriptionStats>,
  },
  Mint {
    stats: Snapshot<InscriptionStats>,
    to: Snapshot<Balance>,
    amount: Num,
  },
  Transfer {
    stats: Snapshot<InscriptionStats>,
    from: Snapshot<Balance>,
    to: Snapshot<Balance>,
    amount: Num,
    /// Consumed transfer inscription on utxo-mode ticks.
    utxo: Option<Snapshot<TransferUtxo>>,
  },
  List {
    stats: Snapshot<InscriptionStats>,
    from: String,
    to: String,
    amount: Num,
  },
  Exchange {
    stats: Snapshot<InscriptionStats>,
    from: Snapshot<Balance>,
    to: Snapshot<Balance>,
    amount: Num,
  },
  InscribeTransfer {
    stats: Snapshot<InscriptionStats>,
    balance: Snapshot<Balance>,
    utxo: Snapshot<TransferUtxo>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
  pub block: BlockContext,
  pub tx: TxRef,
  /// Position of the event among the events of its transaction.
  pub index: u32,
  pub tick: TickKey,
  /// Normalized metadata the event was produced from.
  pub content: String,
  pub kind: EventKind,
}

impl Event {
  pub fn op(&self) -> OperationType {
    match self.kind {
      EventKind::Deploy { .. } => OperationType::Deploy,
      EventKind::Mint { .. } => OperationType::Mint,
      EventKind::Transfer { .. } => OperationType::Transfer,
      EventKind::List { .. } => OperationType::List,
      EventKind::Exchange { .. } => OperationType::Exchange,
      EventKind::InscribeTransfer { .. } => OperationType::InscribeTransfer,
    }
  }

  pub fn stats(&self) -> &InscriptionStats {
    match &self.kind {
      EventKind::Deploy { stats, .. }
      | EventKind::Mint { stats, .. }
      | EventKind::Transfer { stats, .. }
      | EventKind::List { stats, .. }
      | EventKind::Exchange { stats, .. }
      | EventKind::InscribeTransfer { stats, .. } => &stats.row,
    }
  }

  /// Amount the event moved; the supply for a deploy.
  pub fn amount(&self) -> Num {
    match &self.kind {
      EventKind::Deploy { inscription, .. } => inscription.row.max_supply.clone(),
      EventKind::Mint { amount, .. }
      | EventKind::Transfer { amount, .. }
      | EventKind::List { amount, .. }
      | EventKind::Exchange { amount, .. } => amount.clone(),
      EventKind::InscribeTransfer { utxo, .. } => utxo.row.amount.clone(),
    }
  }
}

/// Events a block produced, in transaction order.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDelta {
  pub block: BlockContext,
  pub events: Vec<Event>,
}
