use super::{Entity, EntityKind, TickKey};
use crate::protocol::Num;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
  Balance,
  Utxo,
}

impl TransferType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Balance => "balance",
      Self::Utxo => "utxo",
    }
  }
}

impl FromStr for TransferType {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "balance" => Ok(Self::Balance),
      "utxo" => Ok(Self::Utxo),
      other => Err(anyhow::anyhow!("unknown transfer type {other}")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inscription {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub max_supply: Num,
  pub limit_per_mint: Num,
  pub decimals: u8,
  pub transfer_type: TransferType,
  pub deploy_by: String,
  pub deploy_hash: String,
  pub deploy_block: u64,
  pub deploy_time: u32,
}

impl Inscription {
  pub fn tick_key(&self) -> TickKey {
    TickKey::new(&self.protocol, &self.tick)
  }
}

impl Entity for Inscription {
  type Key = TickKey;
  const KIND: EntityKind = EntityKind::Inscription;

  fn key(&self) -> Self::Key {
    self.tick_key()
  }

  fn sid(&self) -> u64 {
    self.sid
  }

  fn set_sid(&mut self, sid: u64) {
    self.sid = sid;
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InscriptionStats {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub minted: Num,
  pub holders: u64,
  pub tx_cnt: u64,
  pub mint_first_block: Option<u64>,
  pub mint_last_block: Option<u64>,
  pub mint_completed_time: Option<u32>,
}

impl InscriptionStats {
  pub fn new(inscription: &Inscription) -> Self {
    Self {
      sid: 0,
      chain: inscription.chain.clone(),
      protocol: inscription.protocol.clone(),
      tick: inscription.tick.clone(),
      minted: Num::zero(),
      holders: 0,
      tx_cnt: 1,
      mint_first_block: None,
      mint_last_block: None,
      mint_completed_time: None,
    }
  }

  pub fn has_mint_memory(&self) -> bool {
    self.mint_first_block.is_some()
      || self.mint_last_block.is_some()
      || self.mint_completed_time.is_some()
  }
}

impl Entity for InscriptionStats {
  type Key = TickKey;
  const KIND: EntityKind = EntityKind::Stats;

  fn key(&self) -> Self::Key {
    TickKey::new(&self.protocol, &self.tick)
  }

  fn sid(&self) -> u64 {
    self.sid
  }

  fn set_sid(&mut self, sid: u64) {
    self.sid = sid;
  }

  fn merge(&mut self, earlier: &Self) {
    self.mint_first_block = self.mint_first_block.or(earlier.mint_first_block);
    self.mint_last_block = self.mint_last_block.or(earlier.mint_last_block);
    self.mint_completed_time = self.mint_completed_time.or(earlier.mint_completed_time);
  }
}
