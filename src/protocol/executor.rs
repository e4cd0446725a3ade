use super::{
  error::{amount_reject, Error},
  params::{BRC20_PROTOCOL, MAXIMUM_SUPPLY, MAX_DECIMAL_WIDTH, TICK_BYTE_COUNT},
  BlockContext, ChainGroup, Deploy, Exchange, ExchangeTick, InscriptionError, InscriptionRef,
  Message, Metadata, Num, Operation, StateReader, TxRef,
};
use crate::datastore::{
  Balance, Event, EventKind, Inscription, InscriptionStats, Snapshot, TickKey, TransferType,
  TransferUtxo, UtxoStatus,
};
use std::ops::Deref;

pub(super) fn execute<R: StateReader>(
  context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  msg: &Message,
) -> Result<Event, Error<R>> {
  let (tick, content, kind) = match msg {
    Message::Inscribe {
      metadata,
      inscription,
    } => {
      let kind = match &metadata.op {
        Operation::Deploy(deploy) => process_deploy(context, tx, reader, metadata, deploy)?,
        Operation::Mint(mint) => process_mint(context, tx, reader, metadata, &mint.amount)?,
        Operation::Transfer(transfer) => match inscription {
          Some(inscription) => {
            process_inscribe_transfer(context, tx, reader, metadata, &transfer.amount, inscription)?
          }
          None => process_transfer(context, tx, reader, metadata, &transfer.amount)?,
        },
        Operation::List(list) => process_list(context, tx, reader, metadata, &list.amount)?,
      };
      (metadata.tick_key(), metadata.to_json(), kind)
    }
    Message::Exchange(exchange) => process_exchange(reader, exchange)?,
    Message::Spend { sn, to, location } => process_spend(reader, sn, to, location)?,
  };

  Ok(Event {
    block: context.clone(),
    tx: tx.clone(),
    index: 0,
    tick,
    content,
    kind,
  })
}

fn state<R: StateReader>(e: R::Error) -> Error<R> {
  Error::State(e)
}

fn get_inscription<R: StateReader>(reader: &R, tick: &TickKey) -> Result<Inscription, Error<R>> {
  reader
    .get_inscription(tick)
    .map_err(state::<R>)?
    .ok_or_else(|| Error::Inscription(InscriptionError::TickNotFound(tick.tick.clone())))
}

fn get_stats<R: StateReader>(reader: &R, tick: &TickKey) -> Result<InscriptionStats, Error<R>> {
  reader
    .get_stats(tick)
    .map_err(state::<R>)?
    .ok_or_else(|| Error::Inconsistent(format!("stats of deployed tick {tick} not found")))
}

fn get_balance<R: StateReader>(
  reader: &R,
  inscription: &Inscription,
  address: &str,
) -> Result<Balance, Error<R>> {
  let tick = inscription.tick_key();
  Ok(
    reader
      .get_balance(&tick, address)
      .map_err(state::<R>)?
      .unwrap_or_else(|| Balance::new(&inscription.chain, &tick, address)),
  )
}

fn parse_amount<R: StateReader>(amount: &str, inscription: &Inscription) -> Result<Num, Error<R>> {
  let amt = Num::parse(amount, inscription.decimals).map_err(amount_reject)?;
  if !amt.is_positive() {
    return Err(Error::Inscription(InscriptionError::InvalidZeroAmount));
  }
  Ok(amt)
}

fn receiver<R: StateReader>(tx: &TxRef) -> Result<String, Error<R>> {
  tx.to
    .clone()
    .ok_or(Error::Inscription(InscriptionError::MissingReceiver))
}

fn decrement_holders<R: StateReader>(stats: &mut InscriptionStats) -> Result<(), Error<R>> {
  stats.holders = stats.holders.checked_sub(1).ok_or_else(|| {
    Error::Inconsistent(format!(
      "holders of {}:{} would drop below zero",
      stats.protocol, stats.tick
    ))
  })?;
  Ok(())
}

fn process_deploy<R: StateReader>(
  context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  metadata: &Metadata,
  deploy: &Deploy,
) -> Result<EventKind, Error<R>> {
  if metadata.protocol.is_empty() || metadata.tick.is_empty() {
    return Err(Error::Inscription(InscriptionError::EmptyTick));
  }

  if (context.group == ChainGroup::Btc || metadata.protocol == BRC20_PROTOCOL)
    && metadata.tick_len != TICK_BYTE_COUNT
  {
    return Err(Error::Inscription(InscriptionError::InvalidTickLen(
      metadata.tick.clone(),
    )));
  }

  let tick = metadata.tick_key();
  if let Some(stored) = reader.get_inscription(&tick).map_err(state::<R>)? {
    return Err(Error::Inscription(InscriptionError::DuplicateTick(
      stored.tick,
    )));
  }

  let dec = match &deploy.decimals {
    Some(dec) => Num::parse_integer(dec)
      .and_then(|num| num.checked_to_u8())
      .map_err(|_| InscriptionError::InvalidDecimals(dec.clone()))?,
    None => MAX_DECIMAL_WIDTH,
  };
  if dec > MAX_DECIMAL_WIDTH {
    return Err(Error::Inscription(InscriptionError::DecimalsTooLarge(dec)));
  }

  let supply = Num::parse(&deploy.max_supply, dec)
    .map_err(|_| InscriptionError::InvalidSupply(deploy.max_supply.clone()))?;
  if !supply.is_positive() || supply > *MAXIMUM_SUPPLY.deref() {
    return Err(Error::Inscription(InscriptionError::InvalidSupply(
      deploy.max_supply.clone(),
    )));
  }

  let raw_limit = deploy.mint_limit.as_ref().unwrap_or(&deploy.max_supply);
  let limit = Num::parse(raw_limit, dec).map_err(|_| {
    InscriptionError::MintLimitOutOfRange(metadata.tick.clone(), raw_limit.clone())
  })?;
  if !limit.is_positive() || limit > supply {
    return Err(Error::Inscription(InscriptionError::MintLimitOutOfRange(
      metadata.tick.clone(),
      raw_limit.clone(),
    )));
  }

  let inscription = Inscription {
    sid: 0,
    chain: context.chain.clone(),
    protocol: tick.protocol.clone(),
    tick: tick.tick.clone(),
    max_supply: supply,
    limit_per_mint: limit,
    decimals: dec,
    transfer_type: context.group.transfer_type(),
    deploy_by: tx.from.clone(),
    deploy_hash: tx.hash.clone(),
    deploy_block: context.number,
    deploy_time: context.time,
  };
  let stats = InscriptionStats::new(&inscription);

  Ok(EventKind::Deploy {
    inscription: inscription.into(),
    stats: stats.into(),
  })
}

fn process_mint<R: StateReader>(
  context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  metadata: &Metadata,
  amount: &str,
) -> Result<EventKind, Error<R>> {
  let tick = metadata.tick_key();
  let inscription = get_inscription(reader, &tick)?;
  let mut stats = get_stats(reader, &tick)?;

  let mut amt = parse_amount::<R>(amount, &inscription)?;
  if amt > inscription.limit_per_mint {
    return Err(Error::Inscription(InscriptionError::AmountExceedLimit(
      amt.to_string(),
    )));
  }

  if stats.minted >= inscription.max_supply {
    return Err(Error::Inscription(InscriptionError::TickMinted(
      inscription.tick,
    )));
  }

  let remaining = inscription.max_supply.checked_sub(&stats.minted)?;
  if amt > remaining {
    amt = remaining;
  }

  let to = receiver::<R>(tx)?;
  let mut balance = get_balance(reader, &inscription, &to)?;
  if balance.overall.is_zero() {
    stats.holders += 1;
  }
  balance.overall = balance.overall.checked_add(&amt)?;
  balance.available = balance.available.checked_add(&amt)?;

  if stats.minted.is_zero() {
    stats.mint_first_block = Some(context.number);
  }
  stats.minted = stats.minted.checked_add(&amt)?;
  if stats.minted == inscription.max_supply {
    stats.mint_last_block = Some(context.number);
    stats.mint_completed_time = Some(context.time);
  }
  stats.tx_cnt += 1;

  Ok(EventKind::Mint {
    stats: stats.into(),
    to: balance.into(),
    amount: amt,
  })
}

/// Moves `amt` between two balances of a tick, maintaining `holders`.
fn move_balance<R: StateReader>(
  reader: &R,
  inscription: &Inscription,
  stats: &mut InscriptionStats,
  from: &str,
  to: &str,
  amt: &Num,
) -> Result<(Balance, Balance), Error<R>> {
  let mut sender = get_balance(reader, inscription, from)?;
  if sender.overall < *amt || sender.available < *amt {
    return Err(Error::Inscription(InscriptionError::InsufficientBalance(
      sender.available.to_string(),
      amt.to_string(),
    )));
  }

  if from == to {
    return Ok((sender.clone(), sender));
  }

  sender.overall = sender.overall.checked_sub(amt)?;
  sender.available = sender.available.checked_sub(amt)?;

  let mut receiver = get_balance(reader, inscription, to)?;
  if receiver.overall.is_zero() {
    stats.holders += 1;
  }
  receiver.overall = receiver.overall.checked_add(amt)?;
  receiver.available = receiver.available.checked_add(amt)?;

  if sender.overall.is_zero() {
    decrement_holders::<R>(stats)?;
  }

  Ok((sender, receiver))
}

fn process_transfer<R: StateReader>(
  _context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  metadata: &Metadata,
  amount: &str,
) -> Result<EventKind, Error<R>> {
  let tick = metadata.tick_key();
  let inscription = get_inscription(reader, &tick)?;
  if inscription.transfer_type == TransferType::Utxo {
    return Err(Error::Inscription(InscriptionError::InscriptionRequired(
      inscription.tick,
    )));
  }
  let mut stats = get_stats(reader, &tick)?;
  let amt = parse_amount::<R>(amount, &inscription)?;
  let to = receiver::<R>(tx)?;

  let (from, to) = move_balance(reader, &inscription, &mut stats, &tx.from, &to, &amt)?;
  stats.tx_cnt += 1;

  Ok(EventKind::Transfer {
    stats: stats.into(),
    from: from.into(),
    to: to.into(),
    amount: amt,
    utxo: None,
  })
}

fn process_list<R: StateReader>(
  context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  metadata: &Metadata,
  amount: &str,
) -> Result<EventKind, Error<R>> {
  if context.group != ChainGroup::Evm {
    return Err(Error::Inscription(InscriptionError::UnsupportedOperation(
      "list".to_string(),
    )));
  }

  let tick = metadata.tick_key();
  let inscription = get_inscription(reader, &tick)?;
  let mut stats = get_stats(reader, &tick)?;
  let amt = parse_amount::<R>(amount, &inscription)?;

  let balance = get_balance(reader, &inscription, &tx.from)?;
  if balance.overall < amt {
    return Err(Error::Inscription(InscriptionError::InsufficientBalance(
      balance.overall.to_string(),
      amt.to_string(),
    )));
  }
  stats.tx_cnt += 1;

  Ok(EventKind::List {
    stats: stats.into(),
    from: tx.from.clone(),
    to: tx.to.clone().unwrap_or_default(),
    amount: amt,
  })
}

fn process_exchange<R: StateReader>(
  reader: &R,
  exchange: &Exchange,
) -> Result<(TickKey, String, EventKind), Error<R>> {
  let tick = match &exchange.tick {
    ExchangeTick::Named(name) => TickKey::new(&exchange.protocol, name),
    ExchangeTick::Hashed(hash) => reader
      .get_tick_by_hash(hash)
      .map_err(state::<R>)?
      .ok_or_else(|| InscriptionError::TickNotFound(format!("0x{}", hex::encode(hash))))?,
  };
  let inscription = get_inscription(reader, &tick)?;
  let mut stats = get_stats(reader, &tick)?;

  if !exchange.amount.is_positive() {
    return Err(Error::Inscription(InscriptionError::InvalidZeroAmount));
  }

  let (from, to) = move_balance(
    reader,
    &inscription,
    &mut stats,
    &exchange.from,
    &exchange.to,
    &exchange.amount,
  )?;
  stats.tx_cnt += 1;

  let content = exchange.content(&tick);
  Ok((
    tick,
    content,
    EventKind::Exchange {
      stats: stats.into(),
      from: from.into(),
      to: to.into(),
      amount: exchange.amount.clone(),
    },
  ))
}

fn process_inscribe_transfer<R: StateReader>(
  context: &BlockContext,
  tx: &TxRef,
  reader: &R,
  metadata: &Metadata,
  amount: &str,
  inscription_ref: &InscriptionRef,
) -> Result<EventKind, Error<R>> {
  let tick = metadata.tick_key();
  let inscription = get_inscription(reader, &tick)?;
  if inscription.transfer_type != TransferType::Utxo {
    return Err(Error::Inscription(InscriptionError::UnsupportedOperation(
      "inscribe-transfer".to_string(),
    )));
  }
  if reader
    .get_utxo(&inscription_ref.sn)
    .map_err(state::<R>)?
    .is_some()
  {
    return Err(Error::Inscription(InscriptionError::InscriptionExists(
      inscription_ref.sn.clone(),
    )));
  }

  let mut stats = get_stats(reader, &tick)?;
  let amt = parse_amount::<R>(amount, &inscription)?;
  let owner = receiver::<R>(tx)?;

  let mut balance = get_balance(reader, &inscription, &owner)?;
  if balance.available < amt {
    return Err(Error::Inscription(InscriptionError::InsufficientBalance(
      balance.available.to_string(),
      amt.to_string(),
    )));
  }
  balance.available = balance.available.checked_sub(&amt)?;
  stats.tx_cnt += 1;

  let utxo = TransferUtxo {
    sid: 0,
    chain: context.chain.clone(),
    protocol: tick.protocol,
    tick: tick.tick,
    sn: inscription_ref.sn.clone(),
    address: owner,
    amount: amt,
    status: UtxoStatus::Unspent,
    location: inscription_ref.location.clone(),
    offset: inscription_ref.offset,
  };

  Ok(EventKind::InscribeTransfer {
    stats: stats.into(),
    balance: balance.into(),
    utxo: utxo.into(),
  })
}

fn process_spend<R: StateReader>(
  reader: &R,
  sn: &str,
  to: &str,
  location: &str,
) -> Result<(TickKey, String, EventKind), Error<R>> {
  let mut utxo = reader
    .get_utxo(sn)
    .map_err(state::<R>)?
    .filter(|utxo| utxo.status == UtxoStatus::Unspent)
    .ok_or_else(|| InscriptionError::TransferableNotFound(sn.to_string()))?;

  let tick = utxo.tick_key();
  let inscription = reader
    .get_inscription(&tick)
    .map_err(state::<R>)?
    .ok_or_else(|| Error::Inconsistent(format!("tick {tick} of transfer {sn} not found")))?;
  let mut stats = get_stats(reader, &tick)?;
  let amt = utxo.amount.clone();

  let mut sender = reader
    .get_balance(&tick, &utxo.address)
    .map_err(state::<R>)?
    .ok_or_else(|| InscriptionError::TransferableOwnerNotMatch(sn.to_string()))?;
  let transferable = sender.transferable()?;
  if transferable < amt {
    return Err(Error::Inconsistent(format!(
      "transferable {transferable} of {} below inscribed {amt}",
      utxo.address
    )));
  }

  let receiver = if to == utxo.address {
    sender.available = sender.available.checked_add(&amt)?;
    sender.clone()
  } else {
    sender.overall = sender.overall.checked_sub(&amt)?;
    let mut receiver = get_balance(reader, &inscription, to)?;
    if receiver.overall.is_zero() {
      stats.holders += 1;
    }
    receiver.overall = receiver.overall.checked_add(&amt)?;
    receiver.available = receiver.available.checked_add(&amt)?;
    if sender.overall.is_zero() {
      decrement_holders::<R>(&mut stats)?;
    }
    receiver
  };
  stats.tx_cnt += 1;

  utxo.status = UtxoStatus::Spent;
  utxo.location = location.to_string();

  let content = Metadata {
    protocol: tick.protocol.clone(),
    tick: tick.tick.clone(),
    tick_len: tick.tick.len(),
    op: Operation::Transfer(super::Transfer {
      amount: amt.to_string(),
    }),
  }
  .to_json();

  Ok((
    tick,
    content,
    EventKind::Transfer {
      stats: stats.into(),
      from: sender.into(),
      to: receiver.into(),
      amount: amt,
      utxo: Some(utxo.into()),
    },
  ))
}
