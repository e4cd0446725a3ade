use serde::{ser::SerializeStruct, Serialize, Serializer};

/// JSON-RPC error frame of the read API.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApiError {
  Parse(String),
  InvalidRequest(String),
  MethodNotFound(String),
  InvalidParams(String),
  NotFound(String),
  Internal(String),
}

impl ApiError {
  pub(crate) fn code(&self) -> i32 {
    match self {
      Self::Parse(_) => -32700,
      Self::InvalidRequest(_) => -32600,
      Self::MethodNotFound(_) => -32601,
      Self::InvalidParams(_) => -32602,
      Self::NotFound(_) | Self::Internal(_) => -32603,
    }
  }

  pub(crate) fn message(&self) -> &str {
    match self {
      Self::Parse(msg)
      | Self::InvalidRequest(msg)
      | Self::MethodNotFound(msg)
      | Self::InvalidParams(msg)
      | Self::NotFound(msg)
      | Self::Internal(msg) => msg,
    }
  }

  pub(crate) fn not_found<S: ToString>(message: S) -> Self {
    Self::NotFound(format!("{} not found", message.to_string()))
  }

  pub(crate) fn internal<S: ToString>(message: S) -> Self {
    Self::Internal(message.to_string())
  }

  pub(crate) fn invalid_params<S: ToString>(message: S) -> Self {
    Self::InvalidParams(message.to_string())
  }
}

impl Serialize for ApiError {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("ApiError", 2)?;
    state.serialize_field("code", &self.code())?;
    state.serialize_field("message", self.message())?;
    state.end()
  }
}

impl From<anyhow::Error> for ApiError {
  fn from(error: anyhow::Error) -> Self {
    log::error!("error serving request: {error:#}");
    Self::internal(error)
  }
}
