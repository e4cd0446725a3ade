use super::{Cache, CacheError, Table};
use crate::{
  datastore::{
    Balance, Entity, Event, EventKind, Inscription, InscriptionStats, Snapshot, TickKey,
    TransferUtxo, UtxoStatus,
  },
  protocol::StateReader,
};
use std::collections::HashMap;

/// Rows staged by one block, with the sid counter continuing the table's.
#[derive(Debug)]
struct Layer<T: Entity> {
  rows: HashMap<T::Key, (T, bool)>,
  last_sid: u64,
}

impl<T: Entity> Layer<T> {
  fn new(table: &Table<T>) -> Self {
    Self {
      rows: HashMap::new(),
      last_sid: table.last_sid(),
    }
  }

  fn get(&self, table: &Table<T>, key: &T::Key) -> Result<Option<T>, CacheError> {
    match self.rows.get(key) {
      Some((row, _)) => Ok(Some(row.clone())),
      None => table.get(key),
    }
  }

  fn stage(&mut self, snapshot: &mut Snapshot<T>) {
    if snapshot.row.sid() == 0 {
      self.last_sid += 1;
      snapshot.row.set_sid(self.last_sid);
    }
    let key = snapshot.row.key();
    let created = snapshot.created || self.rows.get(&key).map_or(false, |(_, c)| *c);
    self.rows.insert(key, (snapshot.row.clone(), created));
  }

  fn commit(self, table: &Table<T>, keep: impl Fn(&T) -> bool) -> Result<(), CacheError> {
    for (key, (row, created)) in self.rows {
      if !keep(&row) {
        table.remove(&key)?;
      } else if created {
        table.create(row)?;
      } else {
        table.update(row)?;
      }
    }
    table.set_last_sid(self.last_sid);
    Ok(())
  }
}

/// Block-local view over the cache. Validators read through it, events
/// are staged into it, and nothing reaches the cache before `commit`.
#[derive(Debug)]
pub struct BlockState<'a> {
  cache: &'a Cache,
  inscriptions: Layer<Inscription>,
  stats: Layer<InscriptionStats>,
  balances: Layer<Balance>,
  utxos: Layer<TransferUtxo>,
  tick_hashes: HashMap<[u8; 32], TickKey>,
  // `None` marks a location vacated in this block.
  locations: HashMap<String, Option<String>>,
}

impl<'a> BlockState<'a> {
  pub(super) fn new(cache: &'a Cache) -> Self {
    Self {
      cache,
      inscriptions: Layer::new(&cache.inscriptions),
      stats: Layer::new(&cache.stats),
      balances: Layer::new(&cache.balances),
      utxos: Layer::new(&cache.utxos),
      tick_hashes: HashMap::new(),
      locations: HashMap::new(),
    }
  }

  /// Stages the rows of an event, assigning sids to new rows in place.
  pub fn apply(&mut self, event: &mut Event) -> Result<(), CacheError> {
    match &mut event.kind {
      EventKind::Deploy { inscription, stats } => {
        self.inscriptions.stage(inscription);
        self
          .tick_hashes
          .insert(inscription.row.tick_key().name_hash(), inscription.row.tick_key());
        self.stats.stage(stats);
      }
      EventKind::Mint { stats, to, .. } => {
        self.stats.stage(stats);
        self.balances.stage(to);
      }
      EventKind::Transfer {
        stats,
        from,
        to,
        utxo,
        ..
      } => {
        self.stats.stage(stats);
        self.stage_pair(from, to);
        if let Some(utxo) = utxo {
          self.stage_utxo(utxo)?;
        }
      }
      EventKind::List { stats, .. } => self.stats.stage(stats),
      EventKind::Exchange {
        stats, from, to, ..
      } => {
        self.stats.stage(stats);
        self.stage_pair(from, to);
      }
      EventKind::InscribeTransfer {
        stats,
        balance,
        utxo,
      } => {
        self.stats.stage(stats);
        self.balances.stage(balance);
        self.stage_utxo(utxo)?;
      }
    }
    Ok(())
  }

  fn stage_pair(&mut self, from: &mut Snapshot<Balance>, to: &mut Snapshot<Balance>) {
    self.balances.stage(from);
    if to.row.key() == from.row.key() {
      to.row.set_sid(from.row.sid());
    }
    self.balances.stage(to);
  }

  fn stage_utxo(&mut self, utxo: &mut Snapshot<TransferUtxo>) -> Result<(), CacheError> {
    if let Some(previous) = self.utxos.get(&self.cache.utxos, &utxo.row.sn)? {
      self.locations.insert(previous.location, None);
    }
    self.utxos.stage(utxo);
    if utxo.row.status == UtxoStatus::Unspent {
      self
        .locations
        .insert(utxo.row.location.clone(), Some(utxo.row.sn.clone()));
    }
    Ok(())
  }

  /// Writes everything staged into the cache.
  pub fn commit(self) -> Result<(), CacheError> {
    let cache = self.cache;
    self.inscriptions.commit(&cache.inscriptions, |_| true)?;
    self.stats.commit(&cache.stats, |_| true)?;
    self.balances.commit(&cache.balances, |_| true)?;
    self
      .utxos
      .commit(&cache.utxos, |utxo| utxo.status == UtxoStatus::Unspent)?;

    for (_, tick) in self.tick_hashes {
      cache.index_tick(tick)?;
    }
    for (location, sn) in self.locations {
      match sn {
        Some(sn) => cache.index_location(&location, &sn)?,
        None => cache.vacate_location(&location)?,
      }
    }
    Ok(())
  }
}

impl StateReader for BlockState<'_> {
  type Error = CacheError;

  fn get_inscription(&self, tick: &TickKey) -> Result<Option<Inscription>, Self::Error> {
    self.inscriptions.get(&self.cache.inscriptions, tick)
  }

  fn get_stats(&self, tick: &TickKey) -> Result<Option<InscriptionStats>, Self::Error> {
    self.stats.get(&self.cache.stats, tick)
  }

  fn get_balance(&self, tick: &TickKey, address: &str) -> Result<Option<Balance>, Self::Error> {
    self
      .balances
      .get(&self.cache.balances, &(tick.clone(), address.to_string()))
  }

  fn get_utxo(&self, sn: &str) -> Result<Option<TransferUtxo>, Self::Error> {
    self.utxos.get(&self.cache.utxos, &sn.to_string())
  }

  fn get_utxo_by_location(&self, location: &str) -> Result<Option<TransferUtxo>, Self::Error> {
    let sn = match self.locations.get(location) {
      Some(staged) => staged.clone(),
      None => self.cache.sn_at(location)?,
    };
    let Some(sn) = sn else {
      return Ok(None);
    };
    Ok(
      self
        .get_utxo(&sn)?
        .filter(|utxo| utxo.status == UtxoStatus::Unspent && utxo.location == location),
    )
  }

  fn get_tick_by_hash(&self, hash: &[u8; 32]) -> Result<Option<TickKey>, Self::Error> {
    match self.tick_hashes.get(hash) {
      Some(tick) => Ok(Some(tick.clone())),
      None => self.cache.tick_by_hash(hash),
    }
  }
}
