mod deploy;
mod mint;
mod transfer;

use super::error::JSONError;
use crate::datastore::{OperationType, TickKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use self::{deploy::Deploy, mint::Mint, transfer::Transfer};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "op")]
pub enum Operation {
  #[serde(rename = "deploy")]
  Deploy(Deploy),
  #[serde(rename = "mint")]
  Mint(Mint),
  #[serde(rename = "transfer")]
  Transfer(Transfer),
  #[serde(rename = "list")]
  List(Transfer),
}

impl Operation {
  pub fn op_type(&self) -> OperationType {
    match self {
      Self::Deploy(_) => OperationType::Deploy,
      Self::Mint(_) => OperationType::Mint,
      Self::Transfer(_) => OperationType::Transfer,
      Self::List(_) => OperationType::List,
    }
  }
}

/// Inscription metadata with `p`, `op` and `tick` trimmed and lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
  pub protocol: String,
  pub tick: String,
  /// Byte length of the tick as inscribed, before case folding.
  pub tick_len: usize,
  pub op: Operation,
}

impl Metadata {
  pub fn from_json(s: &str) -> Result<Self, JSONError> {
    let value: Value = serde_json::from_str(s).map_err(|_| JSONError::InvalidJson)?;
    let Value::Object(mut object) = value else {
      return Err(JSONError::InvalidJson);
    };

    let protocol = normalize(&mut object, "p")?;
    let op = normalize(&mut object, "op")?;
    let tick_len = required(&object, "tick")?.trim().len();
    let tick = normalize(&mut object, "tick")?;

    let op = match serde_json::from_value::<Operation>(Value::Object(object)) {
      Ok(op) => op,
      Err(e) => {
        if matches!(op.as_str(), "deploy" | "mint" | "transfer" | "list") {
          return Err(JSONError::ParseOperationJsonError(e.to_string()));
        }
        return Err(JSONError::UnSupportOperation(op));
      }
    };

    Ok(Self {
      protocol,
      tick,
      tick_len,
      op,
    })
  }

  /// Serializes the normalized form.
  pub fn to_json(&self) -> String {
    let mut object = match serde_json::to_value(&self.op) {
      Ok(Value::Object(object)) => object,
      _ => Map::new(),
    };
    object.insert("p".into(), Value::String(self.protocol.clone()));
    object.insert("tick".into(), Value::String(self.tick.clone()));
    Value::Object(object).to_string()
  }

  pub fn tick_key(&self) -> TickKey {
    TickKey::new(&self.protocol, &self.tick)
  }
}

fn required<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, JSONError> {
  object
    .get(field)
    .and_then(Value::as_str)
    .ok_or_else(|| JSONError::ParseOperationJsonError(format!("missing field `{field}`")))
}

fn normalize(object: &mut Map<String, Value>, field: &str) -> Result<String, JSONError> {
  let normalized = required(object, field)?.trim().to_lowercase();
  object.insert(field.into(), Value::String(normalized.clone()));
  Ok(normalized)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_deploy_deserialize() {
    let json_str = r##"{
  "p": "asc-20",
  "op": "deploy",
  "tick": "TEST",
  "max": "1000",
  "lim": "100"
}"##;

    assert_eq!(
      Metadata::from_json(json_str).unwrap(),
      Metadata {
        protocol: "asc-20".to_string(),
        tick: "test".to_string(),
        tick_len: 4,
        op: Operation::Deploy(Deploy {
          max_supply: "1000".to_string(),
          mint_limit: Some("100".to_string()),
          decimals: None,
        }),
      }
    );
  }

  #[test]
  fn test_mint_deserialize() {
    let metadata =
      Metadata::from_json(r#"{"p":" ASC-20 ","op":"MINT","tick":" Test ","amt":"100"}"#).unwrap();
    assert_eq!(metadata.protocol, "asc-20");
    assert_eq!(metadata.tick, "test");
    assert_eq!(
      metadata.op,
      Operation::Mint(Mint {
        amount: "100".to_string()
      })
    );
  }

  #[test]
  fn test_list_deserialize() {
    assert_eq!(
      Metadata::from_json(r#"{"p":"asc-20","op":"list","tick":"avav","amt":"5"}"#)
        .unwrap()
        .op,
      Operation::List(Transfer {
        amount: "5".to_string()
      })
    );
  }

  #[test]
  fn test_json_duplicate_field() {
    let json_str = r#"{"p":"asc-20","op":"mint","tick":"smol","amt":"333","amt":"33"}"#;
    assert_eq!(
      Metadata::from_json(json_str).unwrap().op,
      Operation::Mint(Mint {
        amount: "33".to_string()
      })
    );
  }

  #[test]
  fn test_invalid_metadata() {
    assert_eq!(
      Metadata::from_json("not json").unwrap_err(),
      JSONError::InvalidJson
    );
    assert_eq!(Metadata::from_json("[1]").unwrap_err(), JSONError::InvalidJson);
    assert!(matches!(
      Metadata::from_json(r#"{"op":"mint","tick":"abcd","amt":"1"}"#).unwrap_err(),
      JSONError::ParseOperationJsonError(_)
    ));
    assert!(matches!(
      Metadata::from_json(r#"{"p":"asc-20","op":"mint","tick":"abcd"}"#).unwrap_err(),
      JSONError::ParseOperationJsonError(_)
    ));
    assert_eq!(
      Metadata::from_json(r#"{"p":"asc-20","op":"burn","tick":"abcd","amt":"1"}"#).unwrap_err(),
      JSONError::UnSupportOperation("burn".to_string())
    );
  }

  #[test]
  fn test_normalized_round_trip() {
    for json_str in [
      r#"{"p":"ASC-20","op":"Deploy","tick":" TeSt ","max":"21000000","lim":"1000","dec":"8"}"#,
      r#"{"p":"asc-20","op":"mint","tick":"TEST","amt":"1.5"}"#,
      r#"{"p":"brc-20","op":"transfer","tick":"ordi","amt":"10"}"#,
      r#"{"p":"asc-20","op":"LIST","tick":"avav","amt":"500"}"#,
    ] {
      let metadata = Metadata::from_json(json_str).unwrap();
      assert_eq!(Metadata::from_json(&metadata.to_json()).unwrap(), metadata);
    }
  }
}
