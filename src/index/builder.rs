use crate::datastore::{
  AddressTx, Balance, BalanceTxn, BlockDelta, Checkpoint, Entity, Event, EventKind, FlushBatch,
  Inscription, InscriptionStats, Partition, Snapshot, TransferUtxo, TxRecord,
};
use std::collections::BTreeMap;

/// Rows of one entity kind keyed by sid; later snapshots win.
#[derive(Debug)]
struct Coalesced<T: Entity> {
  rows: BTreeMap<u64, (T, bool)>,
}

impl<T: Entity> Default for Coalesced<T> {
  fn default() -> Self {
    Self {
      rows: BTreeMap::new(),
    }
  }
}

impl<T: Entity> Coalesced<T> {
  fn push(&mut self, snapshot: &Snapshot<T>) {
    let mut row = snapshot.row.clone();
    let mut created = snapshot.created;
    if let Some((earlier, earlier_created)) = self.rows.get(&row.sid()) {
      row.merge(earlier);
      created |= earlier_created;
    }
    self.rows.insert(row.sid(), (row, created));
  }

  fn into_partition(self) -> Partition<T> {
    let mut partition = Partition::default();
    for (_, (row, created)) in self.rows {
      if created {
        partition.create.push(row);
      } else {
        partition.update.push(row);
      }
    }
    partition
  }
}

/// Turns drained block deltas into one flush batch.
#[derive(Debug, Default)]
pub(crate) struct BatchBuilder {
  chain: String,
  inscriptions: Coalesced<Inscription>,
  stats: Coalesced<InscriptionStats>,
  balances: Coalesced<Balance>,
  utxos: Coalesced<TransferUtxo>,
  txs: Vec<TxRecord>,
  address_txs: Vec<AddressTx>,
  balance_txns: Vec<BalanceTxn>,
  checkpoint: Option<Checkpoint>,
  blocks: usize,
}

impl BatchBuilder {
  pub(crate) fn new(chain: &str) -> Self {
    Self {
      chain: chain.to_string(),
      ..Default::default()
    }
  }

  pub(crate) fn blocks(&self) -> usize {
    self.blocks
  }

  pub(crate) fn push(&mut self, delta: &BlockDelta) {
    for event in &delta.events {
      self.push_event(event);
    }
    self.checkpoint = Some(Checkpoint {
      chain: delta.block.chain.clone(),
      number: delta.block.number,
      hash: delta.block.hash.clone(),
      time: delta.block.time,
    });
    self.blocks += 1;
  }

  fn push_event(&mut self, event: &Event) {
    let (from, to) = parties(event);
    let amount = event.amount();

    self.txs.push(TxRecord {
      chain: event.block.chain.clone(),
      protocol: event.tick.protocol.clone(),
      tick: event.tick.tick.clone(),
      op: event.op(),
      hash: event.tx.hash.clone(),
      event_index: event.index,
      block_number: event.block.number,
      block_time: event.block.time,
      tx_index: event.tx.index,
      from: from.clone(),
      to: to.clone(),
      amount: amount.clone(),
      gas_price: event.tx.gas_price.to_string(),
      gas_used: event.tx.gas_used.to_string(),
      content: event.content.clone(),
    });

    let mut touched = vec![(to.clone(), from.clone())];
    if from != to {
      touched.insert(0, (from, to));
    }
    for (address, related) in touched {
      self.address_txs.push(AddressTx {
        chain: event.block.chain.clone(),
        protocol: event.tick.protocol.clone(),
        tick: event.tick.tick.clone(),
        event: event.op(),
        hash: event.tx.hash.clone(),
        event_index: event.index,
        address,
        related_address: related,
        amount: amount.clone(),
        block_number: event.block.number,
        block_time: event.block.time,
      });
    }

    match &event.kind {
      EventKind::Deploy { inscription, stats } => {
        self.inscriptions.push(inscription);
        self.stats.push(stats);
      }
      EventKind::Mint { stats, to, .. } => {
        self.stats.push(stats);
        self.push_balance(event, to);
      }
      EventKind::Transfer {
        stats,
        from,
        to,
        utxo,
        ..
      } => {
        self.stats.push(stats);
        self.push_pair(event, from, to);
        if let Some(utxo) = utxo {
          self.utxos.push(utxo);
        }
      }
      EventKind::List { stats, .. } => self.stats.push(stats),
      EventKind::Exchange {
        stats, from, to, ..
      } => {
        self.stats.push(stats);
        self.push_pair(event, from, to);
      }
      EventKind::InscribeTransfer {
        stats,
        balance,
        utxo,
      } => {
        self.stats.push(stats);
        self.push_balance(event, balance);
        self.utxos.push(utxo);
      }
    }
  }

  fn push_pair(&mut self, event: &Event, from: &Snapshot<Balance>, to: &Snapshot<Balance>) {
    if from.row.address == to.row.address {
      self.push_balance(event, to);
    } else {
      self.push_balance(event, from);
      self.push_balance(event, to);
    }
  }

  fn push_balance(&mut self, event: &Event, balance: &Snapshot<Balance>) {
    self.balance_txns.push(BalanceTxn {
      chain: event.block.chain.clone(),
      protocol: event.tick.protocol.clone(),
      tick: event.tick.tick.clone(),
      hash: event.tx.hash.clone(),
      event_index: event.index,
      address: balance.row.address.clone(),
      amount: event.amount(),
      overall: balance.row.overall.clone(),
      available: balance.row.available.clone(),
      block_number: event.block.number,
    });
    self.balances.push(balance);
  }

  pub(crate) fn build(self) -> FlushBatch {
    let stats = self.stats.into_partition();
    let stats_mint = stats
      .update
      .iter()
      .filter(|stats| stats.has_mint_memory())
      .cloned()
      .collect();

    FlushBatch {
      chain: self.chain,
      inscriptions: self.inscriptions.into_partition(),
      stats,
      stats_mint,
      txs: self.txs,
      address_txs: self.address_txs,
      balance_txns: self.balance_txns,
      balances: self.balances.into_partition(),
      utxos: self.utxos.into_partition(),
      checkpoint: self.checkpoint,
    }
  }
}

/// Sender and receiver recorded for an event.
fn parties(event: &Event) -> (String, String) {
  match &event.kind {
    EventKind::Deploy { inscription, .. } => (
      event.tx.from.clone(),
      inscription.row.deploy_by.clone(),
    ),
    EventKind::Mint { to, .. } => (event.tx.from.clone(), to.row.address.clone()),
    EventKind::Transfer { from, to, .. } | EventKind::Exchange { from, to, .. } => {
      (from.row.address.clone(), to.row.address.clone())
    }
    EventKind::List { from, to, .. } => (from.clone(), to.clone()),
    EventKind::InscribeTransfer { balance, .. } => {
      (balance.row.address.clone(), balance.row.address.clone())
    }
  }
}
