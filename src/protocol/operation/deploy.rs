use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Deploy {
  #[serde(rename = "max")]
  pub max_supply: String,
  #[serde(rename = "lim", skip_serializing_if = "Option::is_none")]
  pub mint_limit: Option<String>,
  #[serde(rename = "dec", skip_serializing_if = "Option::is_none")]
  pub decimals: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_serialize() {
    let obj = Deploy {
      max_supply: "100".to_string(),
      mint_limit: Some("10".to_string()),
      decimals: Some("10".to_string()),
    };
    assert_eq!(
      serde_json::to_string(&obj).unwrap(),
      r#"{"max":"100","lim":"10","dec":"10"}"#
    );
  }

  #[test]
  fn test_deserialize_defaults() {
    assert_eq!(
      serde_json::from_str::<Deploy>(r#"{"max":"100"}"#).unwrap(),
      Deploy {
        max_supply: "100".to_string(),
        mint_limit: None,
        decimals: None,
      }
    );
  }

  #[test]
  fn test_numeric_fields_reject() {
    assert!(serde_json::from_str::<Deploy>(r#"{"max":100}"#).is_err());
    assert!(serde_json::from_str::<Deploy>(r#"{"max":"100","dec":8}"#).is_err());
  }

  #[test]
  fn test_whitespace_is_kept() {
    let obj = serde_json::from_str::<Deploy>(r#"{"max":" 100"}"#).unwrap();
    assert_eq!(obj.max_supply, " 100");
  }
}
