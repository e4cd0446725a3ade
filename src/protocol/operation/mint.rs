use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Mint {
  #[serde(rename = "amt")]
  pub amount: String,
}
