use super::{
  read_only::{ADDRESS_TX_COLUMNS, BALANCE_COLUMNS, INSCRIPTION_COLUMNS, STATS_COLUMNS, TX_COLUMNS, UTXO_COLUMNS},
  SqliteStorage, StorageError, LOCK_NAME, LOCK_STALE_SECS,
};
use crate::{
  datastore::{
    Balance, ChainInfo, Checkpoint, FlushBatch, Inscription, InscriptionStats, StorageReadWrite,
    TransferUtxo,
  },
  protocol::Num,
};
use rusqlite::{params, params_from_iter, types::Value, Transaction};

/// Rows per batched `CASE sid` update statement.
const UPDATE_CHUNK_SIZE: usize = 200;

fn placeholders(count: usize) -> String {
  vec!["?"; count].join(", ")
}

fn num(n: &Num) -> Value {
  Value::Text(n.to_string())
}

fn int(n: u64) -> Value {
  Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn opt_int<T: Into<u64>>(n: Option<T>) -> Value {
  n.map_or(Value::Null, |n| int(n.into()))
}

/// Updates `columns` of many rows keyed by sid with one statement per
/// chunk:
/// `UPDATE t SET c = CASE sid WHEN ? THEN ? ... END WHERE chain = ? AND sid IN (...)`.
/// With `keep_existing` a NULL value leaves the stored column untouched.
fn batch_update<T>(
  tx: &Transaction<'_>,
  table: &str,
  chain: &str,
  columns: &[&str],
  rows: &[T],
  sid: impl Fn(&T) -> u64,
  values: impl Fn(&T) -> Vec<Value>,
  keep_existing: bool,
) -> rusqlite::Result<()> {
  for chunk in rows.chunks(UPDATE_CHUNK_SIZE) {
    let whens = vec!["WHEN ? THEN ?"; chunk.len()].join(" ");
    let sets = columns
      .iter()
      .map(|column| {
        if keep_existing {
          format!("{column} = COALESCE(CASE sid {whens} END, {column})")
        } else {
          format!("{column} = CASE sid {whens} END")
        }
      })
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "UPDATE {table} SET {sets} WHERE chain = ? AND sid IN ({})",
      placeholders(chunk.len())
    );

    let row_values = chunk.iter().map(&values).collect::<Vec<_>>();
    let mut args = Vec::with_capacity(columns.len() * chunk.len() * 2 + chunk.len() + 1);
    for column in 0..columns.len() {
      for (row, values) in chunk.iter().zip(&row_values) {
        args.push(int(sid(row)));
        args.push(values[column].clone());
      }
    }
    args.push(Value::Text(chain.to_string()));
    args.extend(chunk.iter().map(|row| int(sid(row))));

    tx.execute(&sql, params_from_iter(args))?;
  }
  Ok(())
}

fn insert_rows<T>(
  tx: &Transaction<'_>,
  verb: &str,
  table: &str,
  columns: &str,
  rows: &[T],
  values: impl Fn(&T) -> Vec<Value>,
) -> rusqlite::Result<()> {
  if rows.is_empty() {
    return Ok(());
  }
  let count = columns.split(',').count();
  let mut stmt = tx.prepare_cached(&format!(
    "{verb} INTO {table} ({columns}) VALUES ({})",
    placeholders(count)
  ))?;
  for row in rows {
    stmt.execute(params_from_iter(values(row)))?;
  }
  Ok(())
}

fn inscription_values(row: &Inscription) -> Vec<Value> {
  vec![
    Value::Text(row.chain.clone()),
    int(row.sid),
    Value::Text(row.protocol.clone()),
    Value::Text(row.tick.clone()),
    num(&row.max_supply),
    num(&row.limit_per_mint),
    int(row.decimals.into()),
    Value::Text(row.transfer_type.as_str().to_string()),
    Value::Text(row.deploy_by.clone()),
    Value::Text(row.deploy_hash.clone()),
    int(row.deploy_block),
    int(row.deploy_time.into()),
  ]
}

fn stats_values(row: &InscriptionStats) -> Vec<Value> {
  vec![
    Value::Text(row.chain.clone()),
    int(row.sid),
    Value::Text(row.protocol.clone()),
    Value::Text(row.tick.clone()),
    num(&row.minted),
    int(row.holders),
    int(row.tx_cnt),
    opt_int(row.mint_first_block),
    opt_int(row.mint_last_block),
    opt_int(row.mint_completed_time),
  ]
}

fn balance_values(row: &Balance) -> Vec<Value> {
  vec![
    Value::Text(row.chain.clone()),
    int(row.sid),
    Value::Text(row.protocol.clone()),
    Value::Text(row.tick.clone()),
    Value::Text(row.address.clone()),
    num(&row.overall),
    num(&row.available),
  ]
}

fn utxo_values(row: &TransferUtxo) -> Vec<Value> {
  vec![
    Value::Text(row.chain.clone()),
    int(row.sid),
    Value::Text(row.protocol.clone()),
    Value::Text(row.tick.clone()),
    Value::Text(row.sn.clone()),
    Value::Text(row.address.clone()),
    num(&row.amount),
    Value::Integer(row.status.code()),
    Value::Text(row.location.clone()),
    int(row.offset),
  ]
}

impl SqliteStorage {
  fn write_batch(tx: &Transaction<'_>, batch: &FlushBatch) -> rusqlite::Result<()> {
    let chain = batch.chain.as_str();

    insert_rows(
      tx,
      "INSERT OR REPLACE",
      "inscriptions",
      INSCRIPTION_COLUMNS,
      &batch.inscriptions.create,
      inscription_values,
    )?;
    batch_update(
      tx,
      "inscriptions",
      chain,
      &["max_supply", "limit_per_mint", "decimals"],
      &batch.inscriptions.update,
      |row| row.sid,
      |row| vec![num(&row.max_supply), num(&row.limit_per_mint), int(row.decimals.into())],
      false,
    )?;

    insert_rows(
      tx,
      "INSERT OR REPLACE",
      "inscriptions_stats",
      STATS_COLUMNS,
      &batch.stats.create,
      stats_values,
    )?;
    batch_update(
      tx,
      "inscriptions_stats",
      chain,
      &["minted", "holders", "tx_cnt"],
      &batch.stats.update,
      |row| row.sid,
      |row| vec![num(&row.minted), int(row.holders), int(row.tx_cnt)],
      false,
    )?;
    batch_update(
      tx,
      "inscriptions_stats",
      chain,
      &["mint_first_block", "mint_last_block", "mint_completed_time"],
      &batch.stats_mint,
      |row| row.sid,
      |row| {
        vec![
          opt_int(row.mint_first_block),
          opt_int(row.mint_last_block),
          opt_int(row.mint_completed_time),
        ]
      },
      true,
    )?;

    insert_rows(tx, "INSERT OR IGNORE", "txs", TX_COLUMNS, &batch.txs, |row| {
      vec![
        Value::Text(row.chain.clone()),
        Value::Text(row.protocol.clone()),
        Value::Text(row.tick.clone()),
        Value::Text(row.op.as_str().to_string()),
        Value::Text(row.hash.clone()),
        int(row.event_index.into()),
        int(row.block_number),
        int(row.block_time.into()),
        int(row.tx_index.into()),
        Value::Text(row.from.clone()),
        Value::Text(row.to.clone()),
        num(&row.amount),
        Value::Text(row.gas_price.clone()),
        Value::Text(row.gas_used.clone()),
        Value::Text(row.content.clone()),
      ]
    })?;
    insert_rows(
      tx,
      "INSERT OR IGNORE",
      "address_txs",
      ADDRESS_TX_COLUMNS,
      &batch.address_txs,
      |row| {
        vec![
          Value::Text(row.chain.clone()),
          Value::Text(row.protocol.clone()),
          Value::Text(row.tick.clone()),
          Value::Text(row.event.as_str().to_string()),
          Value::Text(row.hash.clone()),
          int(row.event_index.into()),
          Value::Text(row.address.clone()),
          Value::Text(row.related_address.clone()),
          num(&row.amount),
          int(row.block_number),
          int(row.block_time.into()),
        ]
      },
    )?;
    insert_rows(
      tx,
      "INSERT OR IGNORE",
      "balance_txn",
      "chain, protocol, tick, hash, event_index, address, amount, overall, available, block_number",
      &batch.balance_txns,
      |row| {
        vec![
          Value::Text(row.chain.clone()),
          Value::Text(row.protocol.clone()),
          Value::Text(row.tick.clone()),
          Value::Text(row.hash.clone()),
          int(row.event_index.into()),
          Value::Text(row.address.clone()),
          num(&row.amount),
          num(&row.overall),
          num(&row.available),
          int(row.block_number),
        ]
      },
    )?;

    insert_rows(
      tx,
      "INSERT OR REPLACE",
      "balances",
      BALANCE_COLUMNS,
      &batch.balances.create,
      balance_values,
    )?;
    batch_update(
      tx,
      "balances",
      chain,
      &["overall", "available"],
      &batch.balances.update,
      |row| row.sid,
      |row| vec![num(&row.overall), num(&row.available)],
      false,
    )?;

    insert_rows(
      tx,
      "INSERT OR REPLACE",
      "utxos",
      UTXO_COLUMNS,
      &batch.utxos.create,
      utxo_values,
    )?;
    batch_update(
      tx,
      "utxos",
      chain,
      &["address", "status", "location"],
      &batch.utxos.update,
      |row| row.sid,
      |row| {
        vec![
          Value::Text(row.address.clone()),
          Value::Integer(row.status.code()),
          Value::Text(row.location.clone()),
        ]
      },
      false,
    )?;

    if let Some(checkpoint) = &batch.checkpoint {
      save_checkpoint(tx, checkpoint)?;
    }
    Ok(())
  }
}

fn save_checkpoint(tx: &Transaction<'_>, checkpoint: &Checkpoint) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO block (chain, number, hash, time) VALUES (?1, ?2, ?3, ?4) \
     ON CONFLICT (chain) DO UPDATE SET number = excluded.number, hash = excluded.hash, time = excluded.time",
    params![
      checkpoint.chain,
      checkpoint.number,
      checkpoint.hash,
      checkpoint.time
    ],
  )?;
  Ok(())
}

impl StorageReadWrite for SqliteStorage {
  fn flush(&self, batch: &FlushBatch) -> Result<(), Self::Error> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    Self::write_batch(&tx, batch)?;
    tx.commit()?;
    Ok(())
  }

  fn save_chain_info(&self, info: &ChainInfo) -> Result<(), Self::Error> {
    self.conn()?.execute(
      "INSERT INTO chain_info (chain, chain_id, chain_group) VALUES (?1, ?2, ?3) \
       ON CONFLICT (chain) DO UPDATE SET chain_id = excluded.chain_id, chain_group = excluded.chain_group",
      params![info.chain, info.chain_id, info.chain_group],
    )?;
    Ok(())
  }

  fn acquire_lock(&self, holder: &str) -> Result<bool, Self::Error> {
    let now = chrono::Utc::now().timestamp();
    let changed = self.conn()?.execute(
      "INSERT INTO global_lock (name, holder, heartbeat) VALUES (?1, ?2, ?3) \
       ON CONFLICT (name) DO UPDATE SET holder = excluded.holder, heartbeat = excluded.heartbeat \
       WHERE global_lock.holder = excluded.holder OR global_lock.heartbeat < ?4",
      params![LOCK_NAME, holder, now, now - LOCK_STALE_SECS],
    )?;
    Ok(changed == 1)
  }

  fn refresh_lock(&self, holder: &str) -> Result<bool, Self::Error> {
    let changed = self.conn()?.execute(
      "UPDATE global_lock SET heartbeat = ?1 WHERE name = ?2 AND holder = ?3",
      params![chrono::Utc::now().timestamp(), LOCK_NAME, holder],
    )?;
    Ok(changed == 1)
  }

  fn release_lock(&self, holder: &str) -> Result<(), Self::Error> {
    self.conn()?.execute(
      "DELETE FROM global_lock WHERE name = ?1 AND holder = ?2",
      params![LOCK_NAME, holder],
    )?;
    Ok(())
  }
}
