use super::{Num, StateReader};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error<R: StateReader> {
  #[error("inscription error: {0}")]
  Inscription(InscriptionError),

  #[error("state error: {0}")]
  State(R::Error),

  #[error("num error: {0}")]
  Num(NumError),

  #[error("state inconsistent: {0}")]
  Inconsistent(String),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum JSONError {
  #[error("missing data prefix")]
  InvalidPrefix,

  #[error("invalid hex input")]
  InvalidHex,

  #[error("input too long: {0}")]
  InputTooLong(usize),

  #[error("unsupport content type: {0}")]
  UnSupportContentType(String),

  #[error("invalid json string")]
  InvalidJson,

  #[error("parse operation json error: {0}")]
  ParseOperationJsonError(String),

  #[error("unsupport operation: {0}")]
  UnSupportOperation(String),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum NumError {
  #[error("{op} overflow: original: {org}, other: {other}")]
  Overflow { op: String, org: Num, other: Num },

  #[error("invalid integer {0}")]
  InvalidInteger(String),

  #[error("invalid number: {0}")]
  InvalidNum(String),

  #[error("number {num} exceeds {max} decimals")]
  PrecisionOverflow { num: String, max: u8 },
}

/// Data rejects: the transaction is skipped and indexing carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Deserialize, Serialize)]
pub enum InscriptionError {
  #[error("empty protocol or tick")]
  EmptyTick,

  #[error("illegal tick length '{0}'")]
  InvalidTickLen(String),

  #[error("tick: {0} has been existed")]
  DuplicateTick(String),

  #[error("tick: {0} not found")]
  TickNotFound(String),

  #[error("invalid decimals {0}")]
  InvalidDecimals(String),

  #[error("decimals {0} too large")]
  DecimalsTooLarge(u8),

  #[error("tick invalid supply {0}")]
  InvalidSupply(String),

  #[error("tick: {0} mint limit out of range {1}")]
  MintLimitOutOfRange(String, String),

  #[error("invalid number: {0}")]
  InvalidNum(String),

  #[error("amount overflow: {0}")]
  AmountOverflow(String),

  #[error("zero amount not allowed")]
  InvalidZeroAmount,

  #[error("amount exceed limit: {0}")]
  AmountExceedLimit(String),

  #[error("tick: {0} mint completed")]
  TickMinted(String),

  #[error("insufficient balance: {0} {1}")]
  InsufficientBalance(String, String),

  #[error("transferable inscription not found: {0}")]
  TransferableNotFound(String),

  #[error("transferable owner not match {0}")]
  TransferableOwnerNotMatch(String),

  #[error("inscription {0} already indexed")]
  InscriptionExists(String),

  #[error("transaction has no receiver")]
  MissingReceiver,

  #[error("transfer of utxo-mode tick {0} needs an inscription")]
  InscriptionRequired(String),

  #[error("operation {0} not supported on this chain")]
  UnsupportedOperation(String),
}

impl<R: StateReader> From<InscriptionError> for Error<R> {
  fn from(e: InscriptionError) -> Self {
    Self::Inscription(e)
  }
}

impl<R: StateReader> From<NumError> for Error<R> {
  fn from(e: NumError) -> Self {
    Self::Num(e)
  }
}

/// Maps a parse failure of a user supplied amount onto the data reject it
/// stands for.
pub(super) fn amount_reject(e: NumError) -> InscriptionError {
  match e {
    NumError::PrecisionOverflow { num, .. } => InscriptionError::AmountOverflow(num),
    NumError::InvalidNum(num) | NumError::InvalidInteger(num) => InscriptionError::InvalidNum(num),
    NumError::Overflow { org, .. } => InscriptionError::AmountOverflow(org.to_string()),
  }
}
