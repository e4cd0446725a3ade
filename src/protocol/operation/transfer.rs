use serde::{Deserialize, Serialize};

/// Body shared by `transfer` and `list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Transfer {
  #[serde(rename = "amt")]
  pub amount: String,
}
