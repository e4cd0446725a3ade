use super::{SqliteStorage, StorageError};
use crate::datastore::{
  AddressTx, Balance, ChainInfo, Checkpoint, EntityKind, Inscription, InscriptionStats,
  StorageReadOnly, TickKey, TransferUtxo, TxRecord,
};
use rusqlite::{params, OptionalExtension, Row};

pub(super) const INSCRIPTION_COLUMNS: &str = "chain, sid, protocol, tick, max_supply, \
  limit_per_mint, decimals, transfer_type, deploy_by, deploy_hash, deploy_block, deploy_time";

pub(super) const STATS_COLUMNS: &str = "chain, sid, protocol, tick, minted, holders, tx_cnt, \
  mint_first_block, mint_last_block, mint_completed_time";

pub(super) const BALANCE_COLUMNS: &str =
  "chain, sid, protocol, tick, address, overall, available";

pub(super) const UTXO_COLUMNS: &str =
  "chain, sid, protocol, tick, sn, address, amount, status, location, sat_offset";

pub(super) const TX_COLUMNS: &str = "chain, protocol, tick, op, hash, event_index, \
  block_number, block_time, tx_index, from_address, to_address, amount, gas_price, gas_used, \
  content";

pub(super) const ADDRESS_TX_COLUMNS: &str = "chain, protocol, tick, event, hash, event_index, \
  address, related_address, amount, block_number, block_time";

fn inscription_from_row(row: &Row<'_>) -> rusqlite::Result<Inscription> {
  Ok(Inscription {
    chain: row.get(0)?,
    sid: row.get(1)?,
    protocol: row.get(2)?,
    tick: row.get(3)?,
    max_supply: row.get(4)?,
    limit_per_mint: row.get(5)?,
    decimals: row.get(6)?,
    transfer_type: row.get(7)?,
    deploy_by: row.get(8)?,
    deploy_hash: row.get(9)?,
    deploy_block: row.get(10)?,
    deploy_time: row.get(11)?,
  })
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<InscriptionStats> {
  Ok(InscriptionStats {
    chain: row.get(0)?,
    sid: row.get(1)?,
    protocol: row.get(2)?,
    tick: row.get(3)?,
    minted: row.get(4)?,
    holders: row.get(5)?,
    tx_cnt: row.get(6)?,
    mint_first_block: row.get(7)?,
    mint_last_block: row.get(8)?,
    mint_completed_time: row.get(9)?,
  })
}

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<Balance> {
  Ok(Balance {
    chain: row.get(0)?,
    sid: row.get(1)?,
    protocol: row.get(2)?,
    tick: row.get(3)?,
    address: row.get(4)?,
    overall: row.get(5)?,
    available: row.get(6)?,
  })
}

fn utxo_from_row(row: &Row<'_>) -> rusqlite::Result<TransferUtxo> {
  Ok(TransferUtxo {
    chain: row.get(0)?,
    sid: row.get(1)?,
    protocol: row.get(2)?,
    tick: row.get(3)?,
    sn: row.get(4)?,
    address: row.get(5)?,
    amount: row.get(6)?,
    status: row.get(7)?,
    location: row.get(8)?,
    offset: row.get(9)?,
  })
}

fn tx_from_row(row: &Row<'_>) -> rusqlite::Result<TxRecord> {
  Ok(TxRecord {
    chain: row.get(0)?,
    protocol: row.get(1)?,
    tick: row.get(2)?,
    op: row.get(3)?,
    hash: row.get(4)?,
    event_index: row.get(5)?,
    block_number: row.get(6)?,
    block_time: row.get(7)?,
    tx_index: row.get(8)?,
    from: row.get(9)?,
    to: row.get(10)?,
    amount: row.get(11)?,
    gas_price: row.get(12)?,
    gas_used: row.get(13)?,
    content: row.get(14)?,
  })
}

fn address_tx_from_row(row: &Row<'_>) -> rusqlite::Result<AddressTx> {
  Ok(AddressTx {
    chain: row.get(0)?,
    protocol: row.get(1)?,
    tick: row.get(2)?,
    event: row.get(3)?,
    hash: row.get(4)?,
    event_index: row.get(5)?,
    address: row.get(6)?,
    related_address: row.get(7)?,
    amount: row.get(8)?,
    block_number: row.get(9)?,
    block_time: row.get(10)?,
  })
}

impl SqliteStorage {
  fn query_page<T>(
    &self,
    sql: &str,
    chain: &str,
    after_sid: u64,
    limit: usize,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
  ) -> Result<Vec<T>, StorageError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
      .query_map(params![chain, after_sid, limit], map)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
  }
}

impl StorageReadOnly for SqliteStorage {
  type Error = StorageError;

  fn get_checkpoint(&self, chain: &str) -> Result<Option<Checkpoint>, Self::Error> {
    let conn = self.conn()?;
    Ok(
      conn
        .query_row(
          "SELECT chain, number, hash, time FROM block WHERE chain = ?1",
          params![chain],
          |row| {
            Ok(Checkpoint {
              chain: row.get(0)?,
              number: row.get(1)?,
              hash: row.get(2)?,
              time: row.get(3)?,
            })
          },
        )
        .optional()?,
    )
  }

  fn get_chain_info(&self, chain: &str) -> Result<Option<ChainInfo>, Self::Error> {
    let conn = self.conn()?;
    Ok(
      conn
        .query_row(
          "SELECT chain, chain_id, chain_group FROM chain_info WHERE chain = ?1",
          params![chain],
          |row| {
            Ok(ChainInfo {
              chain: row.get(0)?,
              chain_id: row.get(1)?,
              chain_group: row.get(2)?,
            })
          },
        )
        .optional()?,
    )
  }

  fn max_sid(&self, chain: &str, kind: EntityKind) -> Result<u64, Self::Error> {
    let conn = self.conn()?;
    let sql = format!(
      "SELECT COALESCE(MAX(sid), 0) FROM {} WHERE chain = ?1",
      kind.table()
    );
    Ok(conn.query_row(&sql, params![chain], |row| row.get(0))?)
  }

  fn load_inscriptions(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<Inscription>, Self::Error> {
    self.query_page(
      &format!(
        "SELECT {INSCRIPTION_COLUMNS} FROM inscriptions WHERE chain = ?1 AND sid > ?2 ORDER BY sid LIMIT ?3"
      ),
      chain,
      after_sid,
      limit,
      inscription_from_row,
    )
  }

  fn load_stats(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<InscriptionStats>, Self::Error> {
    self.query_page(
      &format!(
        "SELECT {STATS_COLUMNS} FROM inscriptions_stats WHERE chain = ?1 AND sid > ?2 ORDER BY sid LIMIT ?3"
      ),
      chain,
      after_sid,
      limit,
      stats_from_row,
    )
  }

  fn load_balances(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<Balance>, Self::Error> {
    self.query_page(
      &format!(
        "SELECT {BALANCE_COLUMNS} FROM balances WHERE chain = ?1 AND sid > ?2 ORDER BY sid LIMIT ?3"
      ),
      chain,
      after_sid,
      limit,
      balance_from_row,
    )
  }

  fn load_unspent_utxos(
    &self,
    chain: &str,
    after_sid: u64,
    limit: usize,
  ) -> Result<Vec<TransferUtxo>, Self::Error> {
    self.query_page(
      &format!(
        "SELECT {UTXO_COLUMNS} FROM utxos WHERE chain = ?1 AND sid > ?2 AND status = 0 ORDER BY sid LIMIT ?3"
      ),
      chain,
      after_sid,
      limit,
      utxo_from_row,
    )
  }

  fn get_inscription(
    &self,
    chain: &str,
    tick: &TickKey,
  ) -> Result<Option<Inscription>, Self::Error> {
    let conn = self.conn()?;
    Ok(
      conn
        .query_row(
          &format!(
            "SELECT {INSCRIPTION_COLUMNS} FROM inscriptions WHERE chain = ?1 AND protocol = ?2 AND tick = ?3"
          ),
          params![chain, tick.protocol, tick.tick],
          inscription_from_row,
        )
        .optional()?,
    )
  }

  fn get_stats(
    &self,
    chain: &str,
    tick: &TickKey,
  ) -> Result<Option<InscriptionStats>, Self::Error> {
    let conn = self.conn()?;
    Ok(
      conn
        .query_row(
          &format!(
            "SELECT {STATS_COLUMNS} FROM inscriptions_stats WHERE chain = ?1 AND protocol = ?2 AND tick = ?3"
          ),
          params![chain, tick.protocol, tick.tick],
          stats_from_row,
        )
        .optional()?,
    )
  }

  fn get_inscriptions(
    &self,
    chain: &str,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Inscription>, Self::Error> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT {INSCRIPTION_COLUMNS} FROM inscriptions WHERE chain = ?1 ORDER BY sid LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt
      .query_map(params![chain, limit, offset], inscription_from_row)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
  }

  fn get_balance(
    &self,
    chain: &str,
    tick: &TickKey,
    address: &str,
  ) -> Result<Option<Balance>, Self::Error> {
    let conn = self.conn()?;
    Ok(
      conn
        .query_row(
          &format!(
            "SELECT {BALANCE_COLUMNS} FROM balances WHERE chain = ?1 AND protocol = ?2 AND tick = ?3 AND address = ?4"
          ),
          params![chain, tick.protocol, tick.tick, address],
          balance_from_row,
        )
        .optional()?,
    )
  }

  fn get_balances(&self, chain: &str, address: &str) -> Result<Vec<Balance>, Self::Error> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT {BALANCE_COLUMNS} FROM balances WHERE chain = ?1 AND address = ?2 ORDER BY sid"
    ))?;
    let rows = stmt
      .query_map(params![chain, address], balance_from_row)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
  }

  fn get_transaction(&self, chain: &str, hash: &str) -> Result<Vec<TxRecord>, Self::Error> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT {TX_COLUMNS} FROM txs WHERE chain = ?1 AND hash = ?2 ORDER BY event_index"
    ))?;
    let rows = stmt
      .query_map(params![chain, hash], tx_from_row)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
  }

  fn get_address_transactions(
    &self,
    chain: &str,
    address: &str,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<AddressTx>, Self::Error> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT {ADDRESS_TX_COLUMNS} FROM address_txs WHERE chain = ?1 AND address = ?2 \
       ORDER BY block_number DESC, hash, event_index LIMIT ?3 OFFSET ?4"
    ))?;
    let rows = stmt
      .query_map(params![chain, address, limit, offset], address_tx_from_row)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
  }
}
