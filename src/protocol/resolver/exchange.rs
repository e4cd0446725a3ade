use super::super::{Metadata, Num, Operation, Transfer};
use crate::{datastore::TickKey, index::LogData};
use once_cell::sync::Lazy;
use web3::{
  ethabi::{self, ParamType, Token},
  signing::keccak256,
  types::{H160, H256},
};

pub const EXCHANGE_PROTOCOL: &str = "asc-20";

pub static TRANSFER_FOR_LISTING_TOPIC: Lazy<H256> = Lazy::new(|| {
  H256::from(keccak256(
    b"avascriptions_protocol_TransferASC20TokenForListing(address,address,bytes32)",
  ))
});

pub static ORDER_EXECUTED_TOPIC: Lazy<H256> = Lazy::new(|| {
  H256::from(keccak256(
    b"avascriptions_protocol_ASC20OrderExecuted(address,address,bytes32,string,uint256,uint256,uint16,uint64)",
  ))
});

pub static TRANSFER_TOKEN_TOPIC: Lazy<H256> = Lazy::new(|| {
  H256::from(keccak256(
    b"avascriptions_protocol_TransferASC20Token(address,address,string,uint256)",
  ))
});

/// Log topics the backfill filter asks for when none are configured.
pub fn default_topics() -> Vec<H256> {
  vec![
    *TRANSFER_FOR_LISTING_TOPIC,
    *ORDER_EXECUTED_TOPIC,
    *TRANSFER_TOKEN_TOPIC,
  ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeTick {
  Named(String),
  /// keccak256 of the lowercased tick, as carried by an indexed string.
  Hashed([u8; 32]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
  pub protocol: String,
  pub tick: ExchangeTick,
  pub from: String,
  pub to: String,
  pub amount: Num,
  pub log_index: u64,
}

impl Exchange {
  /// Normalized metadata recorded for the event.
  pub fn content(&self, tick: &TickKey) -> String {
    Metadata {
      protocol: tick.protocol.clone(),
      tick: tick.tick.clone(),
      tick_len: tick.tick.len(),
      op: Operation::Transfer(Transfer {
        amount: self.amount.to_string(),
      }),
    }
    .to_json()
  }
}

fn topic_address(topic: &H256) -> String {
  format!("{:?}", H160::from_slice(&topic.as_bytes()[12..]))
}

struct OrderExecuted {
  list_id: Vec<u8>,
  ticker: String,
  amount: Num,
}

fn decode_order(data: &[u8]) -> Option<OrderExecuted> {
  let tokens = ethabi::decode(
    &[
      ParamType::FixedBytes(32),
      ParamType::String,
      ParamType::Uint(256),
      ParamType::Uint(256),
      ParamType::Uint(16),
      ParamType::Uint(64),
    ],
    data,
  )
  .ok()?;

  match tokens.as_slice() {
    [Token::FixedBytes(list_id), Token::String(ticker), Token::Uint(amount), ..] => {
      Some(OrderExecuted {
        list_id: list_id.clone(),
        ticker: ticker.clone(),
        amount: Num::from_integer_digits(&amount.to_string()).ok()?,
      })
    }
    _ => None,
  }
}

/// Extracts exchanges from the logs of one transaction, in log order.
///
/// A listing transfer followed by an order execution with the same list id
/// is one exchange from the seller to the buyer. A standalone token
/// transfer names its tick only by hash.
pub fn resolve_logs(logs: &[LogData]) -> Vec<Exchange> {
  let mut exchanges = Vec::new();
  let mut listing: Option<(&LogData, Vec<u8>)> = None;

  for log in logs {
    let Some(topic0) = log.topics.first() else {
      continue;
    };

    if *topic0 == *TRANSFER_FOR_LISTING_TOPIC {
      if log.topics.len() < 3 {
        continue;
      }
      let list_id = match log.topics.get(3) {
        Some(id) => id.as_bytes().to_vec(),
        None if log.data.len() >= 32 => log.data[..32].to_vec(),
        None => continue,
      };
      listing = Some((log, list_id));
    } else if *topic0 == *ORDER_EXECUTED_TOPIC {
      let Some((listed, list_id)) = listing.take() else {
        log::debug!("order executed without listing in log {}", log.log_index);
        continue;
      };
      let Some(order) = decode_order(&log.data) else {
        log::debug!("undecodable order executed log {}", log.log_index);
        continue;
      };
      if order.list_id != list_id {
        log::debug!(
          "list id mismatch: listing 0x{} order 0x{}",
          hex::encode(&list_id),
          hex::encode(&order.list_id)
        );
        continue;
      }
      exchanges.push(Exchange {
        protocol: EXCHANGE_PROTOCOL.to_string(),
        tick: ExchangeTick::Named(order.ticker.trim().to_lowercase()),
        from: topic_address(&listed.topics[1]),
        to: topic_address(&listed.topics[2]),
        amount: order.amount,
        log_index: log.log_index,
      });
    } else if *topic0 == *TRANSFER_TOKEN_TOPIC {
      if log.topics.len() < 4 {
        continue;
      }
      let amount = match ethabi::decode(&[ParamType::Uint(256)], &log.data).ok() {
        Some(tokens) => match tokens.first() {
          Some(Token::Uint(amount)) => Num::from_integer_digits(&amount.to_string()).ok(),
          _ => None,
        },
        None => None,
      };
      let Some(amount) = amount else {
        continue;
      };
      exchanges.push(Exchange {
        protocol: EXCHANGE_PROTOCOL.to_string(),
        tick: ExchangeTick::Hashed(log.topics[3].to_fixed_bytes()),
        from: topic_address(&log.topics[1]),
        to: topic_address(&log.topics[2]),
        amount,
        log_index: log.log_index,
      });
    }
  }

  exchanges
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use web3::types::U256;

  pub(crate) fn address_topic(byte: u8) -> H256 {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(&[byte; 20]);
    H256::from(topic)
  }

  pub(crate) fn exchange_logs(seller: u8, buyer: u8, ticker: &str, amount: u64) -> Vec<LogData> {
    let list_id = [7u8; 32];
    vec![
      LogData {
        address: "0x0000000000000000000000000000000000000abc".to_string(),
        topics: vec![
          *TRANSFER_FOR_LISTING_TOPIC,
          address_topic(seller),
          address_topic(buyer),
        ],
        data: list_id.to_vec(),
        log_index: 0,
      },
      LogData {
        address: "0x0000000000000000000000000000000000000abc".to_string(),
        topics: vec![
          *ORDER_EXECUTED_TOPIC,
          address_topic(seller),
          address_topic(buyer),
        ],
        data: ethabi::encode(&[
          Token::FixedBytes(list_id.to_vec()),
          Token::String(ticker.to_string()),
          Token::Uint(U256::from(amount)),
          Token::Uint(U256::from(1_000u64)),
          Token::Uint(U256::from(200u64)),
          Token::Uint(U256::from(1_700_000_000u64)),
        ]),
        log_index: 1,
      },
    ]
  }

  #[test]
  fn test_listing_then_order() {
    let exchanges = resolve_logs(&exchange_logs(0xaa, 0xbb, "AVAV", 500));
    assert_eq!(
      exchanges,
      vec![Exchange {
        protocol: "asc-20".to_string(),
        tick: ExchangeTick::Named("avav".to_string()),
        from: format!("0x{}", "aa".repeat(20)),
        to: format!("0x{}", "bb".repeat(20)),
        amount: Num::from(500),
        log_index: 1,
      }]
    );
  }

  #[test]
  fn test_list_id_mismatch() {
    let mut logs = exchange_logs(0xaa, 0xbb, "avav", 500);
    logs[0].data = vec![9u8; 32];
    assert!(resolve_logs(&logs).is_empty());
  }

  #[test]
  fn test_order_without_listing() {
    let logs = exchange_logs(0xaa, 0xbb, "avav", 500);
    assert!(resolve_logs(&logs[1..]).is_empty());
  }

  #[test]
  fn test_hashed_transfer() {
    let hash = keccak256(b"avav");
    let logs = vec![LogData {
      address: String::new(),
      topics: vec![
        *TRANSFER_TOKEN_TOPIC,
        address_topic(0x01),
        address_topic(0x02),
        H256::from(hash),
      ],
      data: ethabi::encode(&[Token::Uint(U256::from(42u64))]),
      log_index: 3,
    }];

    assert_eq!(
      resolve_logs(&logs),
      vec![Exchange {
        protocol: "asc-20".to_string(),
        tick: ExchangeTick::Hashed(hash),
        from: format!("0x{}", "01".repeat(20)),
        to: format!("0x{}", "02".repeat(20)),
        amount: Num::from(42),
        log_index: 3,
      }]
    );
  }

  #[test]
  fn test_unrelated_logs_ignored() {
    let logs = vec![LogData {
      address: String::new(),
      topics: vec![H256::zero()],
      data: Vec::new(),
      log_index: 0,
    }];
    assert!(resolve_logs(&logs).is_empty());
  }
}
