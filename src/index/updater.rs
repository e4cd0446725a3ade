use super::{BlockData, BlockSource, ChainStatus, IndexOptions, TxData};
use crate::{
  cache::{BlockState, Cache},
  config::FiltersConfig,
  datastore::{BlockDelta, Event, TickKey},
  protocol::{
    self,
    resolver::{btc, evm, exchange},
    BlockContext, ChainGroup, ExchangeTick, InscriptionRef, Message, Operation, StateReader, TxRef,
  },
  Result,
};
use anyhow::{anyhow, bail};
use futures::{stream, StreamExt, TryStreamExt};
use std::{
  collections::HashSet,
  sync::Arc,
  time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Protocol and tick accept-lists plus the exchange selector gate.
#[derive(Debug, Clone, Default)]
pub struct Filter {
  protocols: HashSet<String>,
  ticks: HashSet<String>,
  selectors: Vec<String>,
}

impl Filter {
  pub fn new(config: &FiltersConfig) -> Result<Self> {
    let selectors = config
      .exchange_selectors
      .iter()
      .map(|selector| {
        let selector = selector.trim().to_lowercase();
        let digits = selector.strip_prefix("0x").unwrap_or(&selector);
        if digits.len() != 8 || hex::decode(digits).is_err() {
          bail!("invalid exchange selector {selector}");
        }
        Ok(format!("0x{digits}"))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      protocols: config
        .whitelist
        .protocols
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect(),
      ticks: config
        .whitelist
        .ticks
        .iter()
        .map(|t| t.trim().to_lowercase())
        .collect(),
      selectors,
    })
  }

  pub fn accepts(&self, tick: &TickKey) -> bool {
    (self.protocols.is_empty() || self.protocols.contains(&tick.protocol))
      && (self.ticks.is_empty() || self.ticks.contains(&tick.tick))
  }

  fn gates_exchange(&self, input: &str) -> bool {
    self.selectors.is_empty()
      || self.selectors.iter().any(|selector| {
        input
          .get(..selector.len())
          .map_or(false, |prefix| prefix.eq_ignore_ascii_case(selector))
      })
  }
}

/// The indexing loop: validates blocks in order against the cache.
pub(super) struct Updater {
  chain: String,
  group: ChainGroup,
  source: Arc<dyn BlockSource>,
  cache: Arc<Cache>,
  status: Arc<ChainStatus>,
  filter: Filter,
  workers: usize,
  profile: bool,
}

impl Updater {
  pub(super) fn new(
    source: Arc<dyn BlockSource>,
    cache: Arc<Cache>,
    status: Arc<ChainStatus>,
    options: &IndexOptions,
  ) -> Self {
    Self {
      chain: options.chain.clone(),
      group: options.group,
      source,
      cache,
      status,
      filter: options.filter.clone(),
      workers: options.workers,
      profile: options.profile,
    }
  }

  pub(super) async fn run(
    self,
    start: u64,
    mut blocks: mpsc::Receiver<BlockData>,
    deltas: mpsc::Sender<BlockDelta>,
    cancel: CancellationToken,
  ) -> Result {
    let mut next = start;
    loop {
      let block = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        block = blocks.recv() => match block {
          Some(block) => block,
          None => return Ok(()),
        },
      };
      if block.number < next {
        log::info!("skip replayed block {}", block.number);
        continue;
      }

      let delta = loop {
        match self.index_block(&block).await {
          Ok(delta) => break delta,
          Err(e) => {
            log::error!("failed to index block {}, retrying: {e:#}", block.number);
            tokio::select! {
              _ = cancel.cancelled() => return Ok(()),
              _ = tokio::time::sleep(RETRY_INTERVAL) => {}
            }
          }
        }
      };

      next = block.number + 1;
      self.status.set_indexed(block.number);
      if deltas.send(delta).await.is_err() {
        return Ok(());
      }
    }
  }

  /// Validates one block as a unit; nothing reaches the cache unless the
  /// whole block succeeds.
  pub(super) async fn index_block(&self, block: &BlockData) -> Result<BlockDelta> {
    let start = Instant::now();
    let context = BlockContext {
      chain: self.chain.clone(),
      group: self.group,
      number: block.number,
      hash: block.hash.clone(),
      time: block.time,
    };

    let mut state = self.cache.block_state();
    let mut events = Vec::new();

    match self.group {
      ChainGroup::Evm => {
        for (tx, messages) in self.account_candidates(block).await? {
          self.execute(&context, &mut state, &tx, &messages, &mut events)?;
        }
      }
      ChainGroup::Btc => {
        for tx in &block.txs {
          let mut messages = self.spends(&state, tx).await?;
          messages.extend(self.decode_inscription(tx)?);
          if !messages.is_empty() {
            self.execute(&context, &mut state, tx, &messages, &mut events)?;
          }
        }
      }
    }

    state.commit()?;

    if self.profile {
      log::info!(
        "indexed block {} with {} events in {} ms",
        block.number,
        events.len(),
        start.elapsed().as_millis()
      );
    }
    Ok(BlockDelta {
      block: context,
      events,
    })
  }

  fn execute(
    &self,
    context: &BlockContext,
    state: &mut BlockState<'_>,
    tx: &TxData,
    messages: &[Message],
    events: &mut Vec<Event>,
  ) -> Result {
    let tx_ref = TxRef {
      hash: tx.hash.clone(),
      index: tx.index,
      from: tx.from.clone(),
      to: tx.to.clone(),
      gas_price: tx.gas_price,
      gas_used: tx.gas_used,
    };
    let mut index = 0;
    for msg in messages {
      if let Some(mut event) = protocol::execute(context, &tx_ref, &*state, msg)? {
        event.index = index;
        index += 1;
        state.apply(&mut event)?;
        events.push(event);
      }
    }
    Ok(())
  }

  /// Prefilters, decodes and enriches the transactions of an account-chain
  /// block, keeping block order.
  async fn account_candidates(&self, block: &BlockData) -> Result<Vec<(TxData, Vec<Message>)>> {
    let mut candidates = Vec::new();
    for tx in &block.txs {
      if tx.logs.is_empty() && !evm::has_data_prefix(&tx.input) {
        continue;
      }
      let messages = self.decode_account(tx)?;
      if !messages.is_empty() {
        candidates.push((tx.clone(), messages));
      }
    }
    if candidates.is_empty() {
      return Ok(candidates);
    }

    let source = &self.source;
    let enriched = stream::iter(candidates.into_iter().map(|(tx, messages)| async move {
      Ok::<_, anyhow::Error>(source.enrich(tx).await?.map(|tx| (tx, messages)))
    }))
    .buffered(self.workers)
    .try_collect::<Vec<_>>()
    .await?;

    Ok(enriched.into_iter().flatten().collect())
  }

  fn decode_account(&self, tx: &TxData) -> Result<Vec<Message>> {
    let mut messages = Vec::new();

    if evm::has_data_prefix(&tx.input) {
      match evm::resolve_input(&tx.input) {
        Ok(metadata) => {
          let msg = Message::Inscribe {
            metadata,
            inscription: None,
          };
          if self.wanted(&msg)? {
            messages.push(msg);
          }
        }
        Err(e) => log::debug!("tx {} carries no inscription: {e}", tx.hash),
      }
    }

    if !tx.logs.is_empty() && self.filter.gates_exchange(&tx.input) {
      for exchange in exchange::resolve_logs(&tx.logs) {
        let msg = Message::Exchange(exchange);
        if self.wanted(&msg)? {
          messages.push(msg);
        }
      }
    }
    Ok(messages)
  }

  fn decode_inscription(&self, tx: &TxData) -> Result<Option<Message>> {
    let Some(inscription) = &tx.inscription else {
      return Ok(None);
    };
    if !btc::is_primary_inscription(&inscription.id) {
      return Ok(None);
    }
    let metadata =
      match btc::resolve_content(inscription.content_type.as_deref(), &inscription.content) {
        Ok(metadata) => metadata,
        Err(e) => {
          log::debug!("inscription {} is not a token operation: {e}", inscription.id);
          return Ok(None);
        }
      };
    let msg = Message::Inscribe {
      metadata,
      inscription: Some(InscriptionRef {
        sn: inscription.id.clone(),
        location: inscription.location.clone(),
        offset: inscription.offset,
      }),
    };
    Ok(self.wanted(&msg)?.then_some(msg))
  }

  /// Applies the accept-lists and skips mints of completed ticks.
  fn wanted(&self, msg: &Message) -> Result<bool> {
    let tick = match msg {
      Message::Inscribe { metadata, .. } => {
        let tick = metadata.tick_key();
        if matches!(metadata.op, Operation::Mint(_)) && self.cache.is_mint_completed(&tick)? {
          log::debug!("skip mint of completed tick {tick}");
          return Ok(false);
        }
        tick
      }
      Message::Exchange(exchange) => match &exchange.tick {
        ExchangeTick::Named(tick) => TickKey::new(&exchange.protocol, tick),
        ExchangeTick::Hashed(hash) => match self.cache.tick_by_hash(hash)? {
          Some(tick) => tick,
          None => return Ok(true),
        },
      },
      Message::Spend { .. } => return Ok(true),
    };
    Ok(self.filter.accepts(&tick))
  }

  /// Tracked transfer inscriptions a utxo-chain transaction spends, with
  /// the receiver found by following each inscribed sat.
  async fn spends(&self, state: &BlockState<'_>, tx: &TxData) -> Result<Vec<Message>> {
    let mut spends = Vec::new();
    let output_values = tx.outputs.iter().map(|output| output.value).collect::<Vec<_>>();

    for (input, outpoint) in tx.inputs.iter().enumerate() {
      let Some(utxo) = state.get_utxo_by_location(outpoint)? else {
        continue;
      };

      let preceding = if input == 0 {
        Vec::new()
      } else {
        self.source.input_values(&tx.inputs[..input]).await?
      };
      if preceding.len() != input {
        return Err(anyhow!(
          "expected {input} input values for tx {}, got {}",
          tx.hash,
          preceding.len()
        ));
      }

      let (to, location) = match btc::locate_sat(&preceding, input, utxo.offset, &output_values) {
        Some(vout) => (
          tx.outputs[vout]
            .address
            .clone()
            .unwrap_or_else(|| utxo.address.clone()),
          format!("{}:{vout}", tx.hash),
        ),
        None => (utxo.address.clone(), format!("{}:fee", tx.hash)),
      };
      log::debug!("transfer {} spent by {} to {to}", utxo.sn, tx.hash);
      spends.push(Message::Spend {
        sn: utxo.sn,
        to,
        location,
      });
    }
    Ok(spends)
  }
}
