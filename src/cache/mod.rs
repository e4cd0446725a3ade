use crate::{
  datastore::{
    Balance, Entity, EntityKind, Inscription, InscriptionStats, StorageReadOnly, TickKey,
    TransferUtxo,
  },
  Result,
};
use anyhow::anyhow;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    RwLock,
  },
};

mod overlay;

pub use self::overlay::BlockState;

const LOAD_PAGE_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("{kind:?} row {key} not found")]
  NotFound { kind: EntityKind, key: String },

  #[error("cache lock poisoned")]
  Poisoned,
}

/// One sub-index: rows by business key plus the sid counter of the kind.
#[derive(Debug)]
pub struct Table<T: Entity> {
  rows: RwLock<HashMap<T::Key, T>>,
  last_sid: AtomicU64,
}

impl<T: Entity> Default for Table<T> {
  fn default() -> Self {
    Self {
      rows: RwLock::new(HashMap::new()),
      last_sid: AtomicU64::new(0),
    }
  }
}

impl<T: Entity> Table<T> {
  pub fn get(&self, key: &T::Key) -> Result<Option<T>, CacheError> {
    Ok(
      self
        .rows
        .read()
        .map_err(|_| CacheError::Poisoned)?
        .get(key)
        .cloned(),
    )
  }

  /// Inserts a new row, assigning the next sid when it has none.
  pub fn create(&self, mut row: T) -> Result<T, CacheError> {
    if row.sid() == 0 {
      row.set_sid(self.last_sid.fetch_add(1, Ordering::SeqCst) + 1);
    } else {
      self.last_sid.fetch_max(row.sid(), Ordering::SeqCst);
    }
    self
      .rows
      .write()
      .map_err(|_| CacheError::Poisoned)?
      .insert(row.key(), row.clone());
    Ok(row)
  }

  pub fn update(&self, row: T) -> Result<(), CacheError> {
    let mut rows = self.rows.write().map_err(|_| CacheError::Poisoned)?;
    match rows.get_mut(&row.key()) {
      Some(slot) => {
        *slot = row;
        Ok(())
      }
      None => Err(CacheError::NotFound {
        kind: T::KIND,
        key: format!("{:?}", row.key()),
      }),
    }
  }

  pub fn remove(&self, key: &T::Key) -> Result<Option<T>, CacheError> {
    Ok(
      self
        .rows
        .write()
        .map_err(|_| CacheError::Poisoned)?
        .remove(key),
    )
  }

  pub fn last_sid(&self) -> u64 {
    self.last_sid.load(Ordering::SeqCst)
  }

  pub(crate) fn set_last_sid(&self, sid: u64) {
    self.last_sid.fetch_max(sid, Ordering::SeqCst);
  }

  pub(crate) fn len(&self) -> Result<usize, CacheError> {
    Ok(self.rows.read().map_err(|_| CacheError::Poisoned)?.len())
  }

  #[cfg(test)]
  pub(crate) fn is_empty(&self) -> Result<bool, CacheError> {
    Ok(self.len()? == 0)
  }

  /// Copies every row, ordered by sid.
  pub fn rows(&self) -> Result<Vec<T>, CacheError> {
    let mut rows = self
      .rows
      .read()
      .map_err(|_| CacheError::Poisoned)?
      .values()
      .cloned()
      .collect::<Vec<_>>();
    rows.sort_by_key(|row| row.sid());
    Ok(rows)
  }
}

/// In-memory mirror of the persisted ledger of one chain. Only the
/// indexing loop writes to it, through [`BlockState::commit`].
#[derive(Debug, Default)]
pub struct Cache {
  pub chain: String,
  pub inscriptions: Table<Inscription>,
  pub stats: Table<InscriptionStats>,
  pub balances: Table<Balance>,
  /// Unspent transfer inscriptions only.
  pub utxos: Table<TransferUtxo>,
  tick_hashes: RwLock<HashMap<[u8; 32], TickKey>>,
  locations: RwLock<HashMap<String, String>>,
}

impl Cache {
  pub fn new(chain: &str) -> Self {
    Self {
      chain: chain.to_string(),
      ..Default::default()
    }
  }

  /// Rebuilds the cache from storage page by page.
  pub fn load<S: StorageReadOnly>(chain: &str, storage: &S) -> Result<Self> {
    let cache = Self::new(chain);

    load_table(&cache.inscriptions, |after| {
      storage.load_inscriptions(chain, after, LOAD_PAGE_SIZE)
    })?;
    load_table(&cache.stats, |after| {
      storage.load_stats(chain, after, LOAD_PAGE_SIZE)
    })?;
    load_table(&cache.balances, |after| {
      storage.load_balances(chain, after, LOAD_PAGE_SIZE)
    })?;
    load_table(&cache.utxos, |after| {
      storage.load_unspent_utxos(chain, after, LOAD_PAGE_SIZE)
    })?;

    for inscription in cache.inscriptions.rows()? {
      cache.index_tick(inscription.tick_key())?;
    }
    for utxo in cache.utxos.rows()? {
      cache.index_location(&utxo.location, &utxo.sn)?;
    }

    for (table_sid, kind) in [
      (&cache.inscriptions.last_sid, EntityKind::Inscription),
      (&cache.stats.last_sid, EntityKind::Stats),
      (&cache.balances.last_sid, EntityKind::Balance),
      (&cache.utxos.last_sid, EntityKind::Utxo),
    ] {
      let max_sid = storage
        .max_sid(chain, kind)
        .map_err(|e| anyhow!("failed to read max sid of {}: {e}", kind.table()))?;
      table_sid.fetch_max(max_sid, Ordering::SeqCst);
    }

    log::info!(
      "cache loaded for {chain}: {} inscriptions, {} balances, {} unspent transfers",
      cache.inscriptions.len()?,
      cache.balances.len()?,
      cache.utxos.len()?,
    );
    Ok(cache)
  }

  pub fn block_state(&self) -> BlockState<'_> {
    BlockState::new(self)
  }

  pub fn tick_by_hash(&self, hash: &[u8; 32]) -> Result<Option<TickKey>, CacheError> {
    Ok(
      self
        .tick_hashes
        .read()
        .map_err(|_| CacheError::Poisoned)?
        .get(hash)
        .cloned(),
    )
  }

  pub fn sn_at(&self, location: &str) -> Result<Option<String>, CacheError> {
    Ok(
      self
        .locations
        .read()
        .map_err(|_| CacheError::Poisoned)?
        .get(location)
        .cloned(),
    )
  }

  /// True once a tick's whole supply is minted.
  pub fn is_mint_completed(&self, tick: &TickKey) -> Result<bool, CacheError> {
    let (Some(inscription), Some(stats)) = (self.inscriptions.get(tick)?, self.stats.get(tick)?)
    else {
      return Ok(false);
    };
    Ok(stats.minted >= inscription.max_supply)
  }

  fn index_tick(&self, tick: TickKey) -> Result<(), CacheError> {
    self
      .tick_hashes
      .write()
      .map_err(|_| CacheError::Poisoned)?
      .insert(tick.name_hash(), tick);
    Ok(())
  }

  fn index_location(&self, location: &str, sn: &str) -> Result<(), CacheError> {
    self
      .locations
      .write()
      .map_err(|_| CacheError::Poisoned)?
      .insert(location.to_string(), sn.to_string());
    Ok(())
  }

  fn vacate_location(&self, location: &str) -> Result<(), CacheError> {
    self
      .locations
      .write()
      .map_err(|_| CacheError::Poisoned)?
      .remove(location);
    Ok(())
  }
}

fn load_table<T, E, F>(table: &Table<T>, mut page: F) -> Result
where
  T: Entity,
  E: std::fmt::Display,
  F: FnMut(u64) -> std::result::Result<Vec<T>, E>,
{
  let mut after = 0;
  loop {
    let rows = page(after).map_err(|e| anyhow!("failed to load {}: {e}", T::KIND.table()))?;
    let count = rows.len();
    for row in rows {
      after = after.max(row.sid());
      table.create(row)?;
    }
    if count < LOAD_PAGE_SIZE {
      return Ok(());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    datastore::{
      sqlite::SqliteStorage, Event, EventKind, FlushBatch, Partition, StorageReadWrite, UtxoStatus,
    },
    protocol::{
      execute,
      test::{inscribe, mock_context, mock_tx, CHAIN},
      ChainGroup, InscriptionRef, Message, Metadata, Num, StateReader, TxRef,
    },
  };
  use pretty_assertions::assert_eq;

  const DEPLOY: &str = r#"{"p":"asc-20","op":"deploy","tick":"test","max":"1000","lim":"100"}"#;
  const MINT: &str = r#"{"p":"asc-20","op":"mint","tick":"test","amt":"100"}"#;

  fn tick() -> TickKey {
    TickKey::new("asc-20", "test")
  }

  fn run_block(
    cache: &Cache,
    group: ChainGroup,
    number: u64,
    txs: &[(TxRef, Message)],
  ) -> Vec<Event> {
    let context = mock_context(group, number);
    let mut state = cache.block_state();
    let mut events = Vec::new();
    for (tx, msg) in txs {
      if let Some(mut event) = execute(&context, tx, &state, msg).unwrap() {
        state.apply(&mut event).unwrap();
        events.push(event);
      }
    }
    state.commit().unwrap();
    events
  }

  #[test]
  fn test_block_reads_its_own_writes() {
    let cache = Cache::new(CHAIN);
    let events = run_block(
      &cache,
      ChainGroup::Evm,
      1,
      &[
        (mock_tx(1, "0xaaaa", "0xaaaa"), inscribe(DEPLOY)),
        (mock_tx(2, "0xcccc", "0xdddd"), inscribe(MINT)),
        (mock_tx(3, "0xcccc", "0xdddd"), inscribe(MINT)),
      ],
    );
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].stats().sid, 1);
    assert_eq!(events[2].stats().sid, 1);

    let stats = cache.stats.get(&tick()).unwrap().unwrap();
    assert_eq!(stats.minted, Num::from(200));
    assert_eq!(stats.holders, 1);
    assert_eq!(stats.tx_cnt, 3);
    assert_eq!(cache.balances.len().unwrap(), 1);
    assert_eq!(cache.balances.last_sid(), 1);
    assert_eq!(
      cache.tick_by_hash(&tick().name_hash()).unwrap(),
      Some(tick())
    );
  }

  #[test]
  fn test_dropped_block_leaves_cache_untouched() {
    let cache = Cache::new(CHAIN);
    run_block(
      &cache,
      ChainGroup::Evm,
      1,
      &[(mock_tx(1, "0xaaaa", "0xaaaa"), inscribe(DEPLOY))],
    );

    {
      let context = mock_context(ChainGroup::Evm, 2);
      let mut state = cache.block_state();
      let mut event = execute(&context, &mock_tx(2, "0xcccc", "0xdddd"), &state, &inscribe(MINT))
        .unwrap()
        .unwrap();
      state.apply(&mut event).unwrap();
      assert_eq!(
        state.get_stats(&tick()).unwrap().unwrap().minted,
        Num::from(100)
      );
    }

    assert_eq!(cache.stats.get(&tick()).unwrap().unwrap().minted, Num::zero());
    assert!(cache.balances.is_empty().unwrap());
    assert_eq!(cache.balances.last_sid(), 0);

    // the retried block gets the same sids
    let events = run_block(
      &cache,
      ChainGroup::Evm,
      2,
      &[(mock_tx(2, "0xcccc", "0xdddd"), inscribe(MINT))],
    );
    let EventKind::Mint { to, .. } = &events[0].kind else {
      panic!("not a mint");
    };
    assert_eq!(to.row.sid, 1);
    assert!(to.created);
  }

  #[test]
  fn test_mint_completion() {
    let cache = Cache::new(CHAIN);
    let mut txs = vec![(
      mock_tx(1, "0xaaaa", "0xaaaa"),
      inscribe(r#"{"p":"asc-20","op":"deploy","tick":"test","max":"200","lim":"100"}"#),
    )];
    txs.push((mock_tx(2, "0xcccc", "0xdddd"), inscribe(MINT)));
    run_block(&cache, ChainGroup::Evm, 1, &txs);
    assert!(!cache.is_mint_completed(&tick()).unwrap());

    run_block(
      &cache,
      ChainGroup::Evm,
      2,
      &[(mock_tx(3, "0xcccc", "0xeeee"), inscribe(MINT))],
    );
    assert!(cache.is_mint_completed(&tick()).unwrap());
    assert!(!cache
      .is_mint_completed(&TickKey::new("asc-20", "none"))
      .unwrap());
  }

  fn btc_inscribe(json: &str, sn: &str, location: &str) -> Message {
    Message::Inscribe {
      metadata: Metadata::from_json(json).unwrap(),
      inscription: Some(InscriptionRef {
        sn: sn.to_string(),
        location: location.to_string(),
        offset: 0,
      }),
    }
  }

  fn seed_btc(cache: &Cache) {
    run_block(
      cache,
      ChainGroup::Btc,
      1,
      &[
        (
          mock_tx(1, "alice", "alice"),
          btc_inscribe(
            r#"{"p":"brc-20","op":"deploy","tick":"ordi","max":"1000","lim":"100"}"#,
            "d0i0",
            "d0:0",
          ),
        ),
        (
          mock_tx(2, "alice", "alice"),
          btc_inscribe(
            r#"{"p":"brc-20","op":"mint","tick":"ordi","amt":"100"}"#,
            "m0i0",
            "m0:0",
          ),
        ),
        (
          mock_tx(3, "alice", "alice"),
          btc_inscribe(
            r#"{"p":"brc-20","op":"transfer","tick":"ordi","amt":"30"}"#,
            "t0i0",
            "t0:0",
          ),
        ),
      ],
    );
  }

  #[test]
  fn test_transfer_location_index() {
    let cache = Cache::new(CHAIN);
    seed_btc(&cache);
    assert_eq!(cache.sn_at("t0:0").unwrap(), Some("t0i0".to_string()));
    assert_eq!(cache.utxos.len().unwrap(), 1);

    let events = run_block(
      &cache,
      ChainGroup::Btc,
      2,
      &[(
        mock_tx(4, "alice", "alice"),
        Message::Spend {
          sn: "t0i0".to_string(),
          to: "bob".to_string(),
          location: "s0:0".to_string(),
        },
      )],
    );
    let EventKind::Transfer { utxo, .. } = &events[0].kind else {
      panic!("not a transfer");
    };
    assert_eq!(utxo.as_ref().unwrap().row.status, UtxoStatus::Spent);

    assert_eq!(cache.sn_at("t0:0").unwrap(), None);
    assert_eq!(cache.sn_at("s0:0").unwrap(), None);
    assert!(cache.utxos.is_empty().unwrap());
    assert_eq!(cache.utxos.last_sid(), 1);

    let bob = cache
      .balances
      .get(&(TickKey::new("brc-20", "ordi"), "bob".to_string()))
      .unwrap()
      .unwrap();
    assert_eq!(bob.overall, Num::from(30));
  }

  #[test]
  fn test_reload_from_storage() {
    let cache = Cache::new(CHAIN);
    seed_btc(&cache);
    run_block(
      &cache,
      ChainGroup::Btc,
      2,
      &[(
        mock_tx(4, "alice", "bob"),
        btc_inscribe(
          r#"{"p":"brc-20","op":"mint","tick":"ordi","amt":"100"}"#,
          "m1i0",
          "m1:0",
        ),
      )],
    );

    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .flush(&FlushBatch {
        chain: CHAIN.to_string(),
        inscriptions: Partition {
          create: cache.inscriptions.rows().unwrap(),
          update: Vec::new(),
        },
        stats: Partition {
          create: cache.stats.rows().unwrap(),
          update: Vec::new(),
        },
        balances: Partition {
          create: cache.balances.rows().unwrap(),
          update: Vec::new(),
        },
        utxos: Partition {
          create: cache.utxos.rows().unwrap(),
          update: Vec::new(),
        },
        ..Default::default()
      })
      .unwrap();

    let reloaded = Cache::load(CHAIN, &storage).unwrap();
    assert_eq!(reloaded.inscriptions.rows().unwrap(), cache.inscriptions.rows().unwrap());
    assert_eq!(reloaded.stats.rows().unwrap(), cache.stats.rows().unwrap());
    assert_eq!(reloaded.balances.rows().unwrap(), cache.balances.rows().unwrap());
    assert_eq!(reloaded.utxos.rows().unwrap(), cache.utxos.rows().unwrap());
    assert_eq!(reloaded.balances.last_sid(), 2);
    assert_eq!(reloaded.sn_at("t0:0").unwrap(), Some("t0i0".to_string()));
    assert_eq!(
      reloaded
        .tick_by_hash(&TickKey::new("brc-20", "ordi").name_hash())
        .unwrap(),
      Some(TickKey::new("brc-20", "ordi"))
    );
  }
}
