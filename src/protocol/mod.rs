use crate::{
  datastore::{Balance, Event, Inscription, InscriptionStats, TickKey, TransferType, TransferUtxo},
  Result,
};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
  fmt::{Debug, Display},
  str::FromStr,
};

mod error;
mod executor;
mod num;
mod operation;
mod params;
pub mod resolver;

pub use self::{
  error::{InscriptionError, JSONError, NumError},
  num::Num,
  operation::{Deploy, Metadata, Mint, Operation, Transfer},
  params::{DATA_PREFIX_HEX, MAX_DECIMAL_WIDTH, MAX_INPUT_LENGTH},
  resolver::exchange::{Exchange, ExchangeTick},
};
use self::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainGroup {
  Evm,
  Btc,
}

impl ChainGroup {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Evm => "evm",
      Self::Btc => "btc",
    }
  }

  /// How ticks deployed on this chain family move between holders.
  pub fn transfer_type(&self) -> TransferType {
    match self {
      Self::Evm => TransferType::Balance,
      Self::Btc => TransferType::Utxo,
    }
  }
}

impl FromStr for ChainGroup {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "evm" => Ok(Self::Evm),
      "btc" => Ok(Self::Btc),
      other => Err(anyhow!("unknown chain group {other}")),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockContext {
  pub chain: String,
  pub group: ChainGroup,
  pub number: u64,
  pub hash: String,
  pub time: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxRef {
  pub hash: String,
  pub index: u32,
  pub from: String,
  pub to: Option<String>,
  pub gas_price: u128,
  pub gas_used: u128,
}

/// Where a freshly created inscription sits on a utxo chain.
#[derive(Debug, Clone, PartialEq)]
pub struct InscriptionRef {
  pub sn: String,
  /// `txid:vout`
  pub location: String,
  pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
  /// Metadata carried by a transaction input or an ordinal inscription.
  Inscribe {
    metadata: Metadata,
    inscription: Option<InscriptionRef>,
  },
  /// Balance movement decoded from marketplace logs.
  Exchange(Exchange),
  /// A tracked transfer inscription moved to `to`.
  Spend {
    sn: String,
    to: String,
    location: String,
  },
}

/// Ledger state the validators read.
pub trait StateReader {
  type Error: Debug + Display;

  fn get_inscription(&self, tick: &TickKey) -> Result<Option<Inscription>, Self::Error>;
  fn get_stats(&self, tick: &TickKey) -> Result<Option<InscriptionStats>, Self::Error>;
  fn get_balance(&self, tick: &TickKey, address: &str) -> Result<Option<Balance>, Self::Error>;
  fn get_utxo(&self, sn: &str) -> Result<Option<TransferUtxo>, Self::Error>;
  fn get_utxo_by_location(&self, location: &str) -> Result<Option<TransferUtxo>, Self::Error>;
  fn get_tick_by_hash(&self, hash: &[u8; 32]) -> Result<Option<TickKey>, Self::Error>;
}

/// Validates one message. Data rejects are logged and yield `None`; any
/// other failure is internal and aborts the block.
pub fn execute<R: StateReader>(
  context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  msg: &Message,
) -> Result<Option<Event>> {
  log::debug!("execute message in tx {}: {:?}", tx.hash, msg);
  match executor::execute(context, tx, reader, msg) {
    Ok(event) => Ok(Some(event)),
    Err(Error::Inscription(e)) => {
      log::info!("reject tx {} in block {}: {e}", tx.hash, context.number);
      Ok(None)
    }
    Err(Error::Inconsistent(e)) => {
      log::error!("FATAL: cache inconsistent at tx {}: {e}", tx.hash);
      Err(anyhow!("cache inconsistent: {e}"))
    }
    Err(e) => Err(anyhow!("execute tx {} failed: {e}", tx.hash)),
  }
}
