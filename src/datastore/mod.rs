pub(super) mod balance;
pub(super) mod events;
pub(super) mod inscription;
pub(super) mod records;
pub mod sqlite;
pub(super) mod tick;
pub(super) mod utxo;

pub use self::{
  balance::Balance,
  events::*,
  inscription::{Inscription, InscriptionStats, TransferType},
  records::{AddressTx, BalanceTxn, ChainInfo, Checkpoint, TxRecord},
  tick::TickKey,
  utxo::{TransferUtxo, UtxoStatus},
};
use std::{
  fmt::{Debug, Display},
  hash::Hash,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Inscription,
  Stats,
  Balance,
  Utxo,
}

impl EntityKind {
  pub fn table(&self) -> &'static str {
    match self {
      Self::Inscription => "inscriptions",
      Self::Stats => "inscriptions_stats",
      Self::Balance => "balances",
      Self::Utxo => "utxos",
    }
  }
}

/// A ledger row with a surrogate `sid` and a business key.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
  type Key: Eq + Hash + Clone + Debug + Send + Sync;
  const KIND: EntityKind;

  fn key(&self) -> Self::Key;
  fn sid(&self) -> u64;
  fn set_sid(&mut self, sid: u64);

  /// Carries over from an earlier write of the same row whatever a later
  /// write must not erase.
  fn merge(&mut self, _earlier: &Self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
  pub create: Vec<T>,
  pub update: Vec<T>,
}

impl<T> Default for Partition<T> {
  fn default() -> Self {
    Self {
      create: Vec::new(),
      update: Vec::new(),
    }
  }
}

impl<T> Partition<T> {
  pub fn is_empty(&self) -> bool {
    self.create.is_empty() && self.update.is_empty()
  }
}

/// Everything one flush writes, in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushBatch {
  pub chain: String,
  pub inscriptions: Partition<Inscription>,
  pub stats: Partition<InscriptionStats>,
  /// Updated stats rows carrying mint block or time memories.
  pub stats_mint: Vec<InscriptionStats>,
  pub txs: Vec<TxRecord>,
  pub address_txs: Vec<AddressTx>,
  pub balance_txns: Vec<BalanceTxn>,
  pub balances: Partition<Balance>,
  pub utxos: Partition<TransferUtxo>,
  pub checkpoint: Option<Checkpoint>,
}

impl FlushBatch {
  pub fn is_empty(&self) -> bool {
    self.checkpoint.is_none() && self.txs.is_empty()
  }
}

pub trait StorageReadOnly {
  type Error: Debug + Display;

  fn get_checkpoint(&self, chain: &str) -> Result<Option<Checkpoint>, Self::Error>;
  fn get_chain_info(&self, chain: &str) -> Result<Option<ChainInfo>, Self::Error>;
  fn max_sid(&self, chain: &str, kind: EntityKind) -> Result<u64, Self::Error>;

  // Cold-start pages, ordered by sid and starting after `after_sid`.
  fn load_inscriptions(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<Inscription>, Self::Error>;
  fn load_stats(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<InscriptionStats>, Self::Error>;
  fn load_balances(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<Balance>, Self::Error>;
  fn load_unspent_utxos(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<TransferUtxo>, Self::Error>;

  fn get_inscription(
    &self,
    chain: &str,
    tick: &TickKey,
  ) -> Result<Option<Inscription>, Self::Error>;
  fn get_stats(&self, chain: &str, tick: &TickKey)
    -> Result<Option<InscriptionStats>, Self::Error>;
  fn get_inscriptions(
    &self,
    chain: &str,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Inscription>, Self::Error>;
  fn get_balance(
    &self,
    chain: &str,
    tick: &TickKey,
    address: &str,
  ) -> Result<Option<Balance>, Self::Error>;
  fn get_balances(&self, chain: &str, address: &str) -> Result<Vec<Balance>, Self::Error>;
  fn get_transaction(&self, chain: &str, hash: &str) -> Result<Vec<TxRecord>, Self::Error>;
  fn get_address_transactions(
    &self,
    chain: &str,
    address: &str,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<AddressTx>, Self::Error>;
}

pub trait StorageReadWrite: StorageReadOnly {
  fn flush(&self, batch: &FlushBatch) -> Result<(), Self::Error>;

  fn save_chain_info(&self, info: &ChainInfo) -> Result<(), Self::Error>;

  /// Takes the advisory lock for `holder`; false when another live holder
  /// has it.
  fn acquire_lock(&self, holder: &str) -> Result<bool, Self::Error>;
  fn refresh_lock(&self, holder: &str) -> Result<bool, Self::Error>;
  fn release_lock(&self, holder: &str) -> Result<(), Self::Error>;
}
