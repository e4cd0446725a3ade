use super::{OperationType, TransferType, UtxoStatus};
use crate::protocol::Num;
use rusqlite::{
  types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
  Connection,
};
use std::{
  str::FromStr,
  sync::{Mutex, MutexGuard},
  time::Duration,
};

mod read_only;
mod read_write;

pub const LOCK_NAME: &str = "indexer_global_lock";

/// A lock whose heartbeat is older than this may be taken over.
pub const LOCK_STALE_SECS: i64 = 60;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS inscriptions (
  chain TEXT NOT NULL,
  sid INTEGER NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  max_supply TEXT NOT NULL,
  limit_per_mint TEXT NOT NULL,
  decimals INTEGER NOT NULL,
  transfer_type TEXT NOT NULL,
  deploy_by TEXT NOT NULL,
  deploy_hash TEXT NOT NULL,
  deploy_block INTEGER NOT NULL,
  deploy_time INTEGER NOT NULL,
  PRIMARY KEY (chain, sid)
);
CREATE UNIQUE INDEX IF NOT EXISTS inscriptions_tick ON inscriptions (chain, protocol, tick);

CREATE TABLE IF NOT EXISTS inscriptions_stats (
  chain TEXT NOT NULL,
  sid INTEGER NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  minted TEXT NOT NULL,
  holders INTEGER NOT NULL,
  tx_cnt INTEGER NOT NULL,
  mint_first_block INTEGER,
  mint_last_block INTEGER,
  mint_completed_time INTEGER,
  PRIMARY KEY (chain, sid)
);
CREATE UNIQUE INDEX IF NOT EXISTS inscriptions_stats_tick ON inscriptions_stats (chain, protocol, tick);

CREATE TABLE IF NOT EXISTS balances (
  chain TEXT NOT NULL,
  sid INTEGER NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  address TEXT NOT NULL,
  overall TEXT NOT NULL,
  available TEXT NOT NULL,
  PRIMARY KEY (chain, sid)
);
CREATE UNIQUE INDEX IF NOT EXISTS balances_holder ON balances (chain, protocol, tick, address);
CREATE INDEX IF NOT EXISTS balances_address ON balances (chain, address);

CREATE TABLE IF NOT EXISTS utxos (
  chain TEXT NOT NULL,
  sid INTEGER NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  sn TEXT NOT NULL,
  address TEXT NOT NULL,
  amount TEXT NOT NULL,
  status INTEGER NOT NULL,
  location TEXT NOT NULL,
  sat_offset INTEGER NOT NULL,
  PRIMARY KEY (chain, sid)
);
CREATE UNIQUE INDEX IF NOT EXISTS utxos_sn ON utxos (chain, sn);

CREATE TABLE IF NOT EXISTS txs (
  chain TEXT NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  op TEXT NOT NULL,
  hash TEXT NOT NULL,
  event_index INTEGER NOT NULL,
  block_number INTEGER NOT NULL,
  block_time INTEGER NOT NULL,
  tx_index INTEGER NOT NULL,
  from_address TEXT NOT NULL,
  to_address TEXT NOT NULL,
  amount TEXT NOT NULL,
  gas_price TEXT NOT NULL,
  gas_used TEXT NOT NULL,
  content TEXT NOT NULL,
  PRIMARY KEY (chain, hash, event_index)
);

CREATE TABLE IF NOT EXISTS address_txs (
  chain TEXT NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  event TEXT NOT NULL,
  hash TEXT NOT NULL,
  event_index INTEGER NOT NULL,
  address TEXT NOT NULL,
  related_address TEXT NOT NULL,
  amount TEXT NOT NULL,
  block_number INTEGER NOT NULL,
  block_time INTEGER NOT NULL,
  PRIMARY KEY (chain, hash, event_index, address)
);
CREATE INDEX IF NOT EXISTS address_txs_address ON address_txs (chain, address, block_number);

CREATE TABLE IF NOT EXISTS balance_txn (
  chain TEXT NOT NULL,
  protocol TEXT NOT NULL,
  tick TEXT NOT NULL,
  hash TEXT NOT NULL,
  event_index INTEGER NOT NULL,
  address TEXT NOT NULL,
  amount TEXT NOT NULL,
  overall TEXT NOT NULL,
  available TEXT NOT NULL,
  block_number INTEGER NOT NULL,
  PRIMARY KEY (chain, hash, event_index, address)
);

CREATE TABLE IF NOT EXISTS block (
  chain TEXT PRIMARY KEY,
  number INTEGER NOT NULL,
  hash TEXT NOT NULL,
  time INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chain_info (
  chain TEXT PRIMARY KEY,
  chain_id INTEGER NOT NULL,
  chain_group TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS global_lock (
  name TEXT PRIMARY KEY,
  holder TEXT NOT NULL,
  heartbeat INTEGER NOT NULL
);
"#;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("storage connection poisoned")]
  Poisoned,
}

/// Relational ledger store on one SQLite connection. The flusher is the
/// only writer; the read API shares the same handle.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

fn trace_statement(sql: &str) {
  log::debug!(target: "sql", "{sql}");
}

impl SqliteStorage {
  pub fn open(dsn: &str, enable_log: bool) -> Result<Self, StorageError> {
    let mut conn = Connection::open(dsn)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    if dsn != ":memory:" {
      conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;",
      )?;
    }
    if enable_log {
      conn.trace(Some(trace_statement));
    }
    conn.execute_batch(SCHEMA)?;

    log::info!("sqlite storage opened at {dsn}");
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::open(":memory:", false)
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::Poisoned)
  }
}

impl ToSql for Num {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.to_string()))
  }
}

impl FromSql for Num {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    Num::from_stored(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
  }
}

impl ToSql for TransferType {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

impl FromSql for TransferType {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    TransferType::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(e.into()))
  }
}

impl ToSql for OperationType {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

impl FromSql for OperationType {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    OperationType::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(e.into()))
  }
}

impl ToSql for UtxoStatus {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.code()))
  }
}

impl FromSql for UtxoStatus {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    Ok(UtxoStatus::from_code(value.as_i64()?))
  }
}
