use super::OperationType;
use crate::protocol::Num;
use serde::{Deserialize, Serialize};

/// Last flushed block of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub chain: String,
  pub number: u64,
  pub hash: String,
  pub time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
  pub chain: String,
  pub chain_id: u64,
  pub chain_group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub op: OperationType,
  pub hash: String,
  pub event_index: u32,
  pub block_number: u64,
  pub block_time: u32,
  pub tx_index: u32,
  pub from: String,
  pub to: String,
  pub amount: Num,
  pub gas_price: String,
  pub gas_used: String,
  pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressTx {
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub event: OperationType,
  pub hash: String,
  pub event_index: u32,
  pub address: String,
  pub related_address: String,
  pub amount: Num,
  pub block_number: u64,
  pub block_time: u32,
}

/// Balance of one address right after an event touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTxn {
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub hash: String,
  pub event_index: u32,
  pub address: String,
  pub amount: Num,
  pub overall: Num,
  pub available: Num,
  pub block_number: u64,
}
