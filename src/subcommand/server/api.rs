use super::{cache::TtlCache, error::ApiError};
use crate::datastore::{StorageReadOnly, TickKey};
use axum::{body::Bytes, extract::State, Json};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

pub(crate) struct ApiState<S> {
  pub(crate) chain: String,
  pub(crate) storage: Arc<S>,
  pub(crate) cache: Arc<TtlCache>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcRequest {
  #[serde(default)]
  id: Value,
  method: String,
  #[serde(default)]
  params: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct RpcResponse {
  jsonrpc: &'static str,
  id: Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  result: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<ApiError>,
}

impl RpcResponse {
  fn new(id: Value, result: Result<Value, ApiError>) -> Self {
    let (result, error) = match result {
      Ok(result) => (Some(result), None),
      Err(error) => (None, Some(error)),
    };
    Self {
      jsonrpc: "2.0",
      id,
      result,
      error,
    }
  }
}

#[derive(Deserialize)]
struct TickParams {
  protocol: String,
  tick: String,
}

#[derive(Deserialize)]
struct PageParams {
  #[serde(default)]
  limit: Option<usize>,
  #[serde(default)]
  offset: usize,
}

impl PageParams {
  fn limit(&self) -> usize {
    self
      .limit
      .unwrap_or(DEFAULT_PAGE_SIZE)
      .clamp(1, MAX_PAGE_SIZE)
  }
}

#[derive(Deserialize)]
struct BalanceParams {
  protocol: String,
  tick: String,
  address: String,
}

#[derive(Deserialize)]
struct AddressParams {
  address: String,
}

#[derive(Deserialize)]
struct HashParams {
  hash: String,
}

#[derive(Deserialize)]
struct AddressPageParams {
  address: String,
  #[serde(flatten)]
  page: PageParams,
}

fn params<T: DeserializeOwned>(params: Value) -> Result<T, ApiError> {
  let params = if params.is_null() { json!({}) } else { params };
  serde_json::from_value(params).map_err(ApiError::invalid_params)
}

fn storage_error<E: std::fmt::Display>(error: E) -> ApiError {
  ApiError::from(anyhow::anyhow!("storage error: {error}"))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ApiError> {
  serde_json::to_value(value).map_err(ApiError::internal)
}

/// Answers one request against storage.
pub(crate) fn dispatch<S: StorageReadOnly>(
  chain: &str,
  storage: &S,
  method: &str,
  raw: Value,
) -> Result<Value, ApiError> {
  match method {
    "getStatus" => {
      let info = storage.get_chain_info(chain).map_err(storage_error)?;
      let checkpoint = storage.get_checkpoint(chain).map_err(storage_error)?;
      to_value(json!({
        "chain": chain,
        "chainInfo": info,
        "checkpoint": checkpoint,
      }))
    }
    "getInscription" => {
      let p: TickParams = params(raw)?;
      let tick = TickKey::new(&p.protocol, &p.tick);
      let inscription = storage
        .get_inscription(chain, &tick)
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found(format!("inscription {tick}")))?;
      let stats = storage.get_stats(chain, &tick).map_err(storage_error)?;
      to_value(json!({
        "inscription": inscription,
        "stats": stats,
      }))
    }
    "getInscriptions" => {
      let p: PageParams = params(raw)?;
      to_value(
        storage
          .get_inscriptions(chain, p.limit(), p.offset)
          .map_err(storage_error)?,
      )
    }
    "getBalance" => {
      let p: BalanceParams = params(raw)?;
      let tick = TickKey::new(&p.protocol, &p.tick);
      to_value(
        storage
          .get_balance(chain, &tick, &p.address)
          .map_err(storage_error)?
          .ok_or_else(|| ApiError::not_found(format!("balance of {} in {tick}", p.address)))?,
      )
    }
    "getBalances" => {
      let p: AddressParams = params(raw)?;
      to_value(
        storage
          .get_balances(chain, &p.address)
          .map_err(storage_error)?,
      )
    }
    "getTransaction" => {
      let p: HashParams = params(raw)?;
      let records = storage
        .get_transaction(chain, &p.hash)
        .map_err(storage_error)?;
      if records.is_empty() {
        return Err(ApiError::not_found(format!("transaction {}", p.hash)));
      }
      to_value(records)
    }
    "getAddressTransactions" => {
      let p: AddressPageParams = params(raw)?;
      to_value(
        storage
          .get_address_transactions(chain, &p.address, p.page.limit(), p.page.offset)
          .map_err(storage_error)?,
      )
    }
    _ => Err(ApiError::MethodNotFound(format!("method {method} not found"))),
  }
}

async fn call<S>(state: &Arc<ApiState<S>>, method: String, params: Value) -> Result<Value, ApiError>
where
  S: StorageReadOnly + Send + Sync + 'static,
{
  let key = format!("{method}:{params}");
  if let Some(value) = state.cache.get(&key) {
    return Ok(value);
  }

  let value = {
    let state = state.clone();
    tokio::task::spawn_blocking(move || {
      dispatch(&state.chain, state.storage.as_ref(), &method, params)
    })
    .await
    .map_err(ApiError::internal)??
  };

  if !state.cache.insert(key, value.clone()) {
    log::debug!("response cache is full");
  }
  Ok(value)
}

/// `POST /`
pub(crate) async fn handle<S>(State(state): State<Arc<ApiState<S>>>, body: Bytes) -> Json<RpcResponse>
where
  S: StorageReadOnly + Send + Sync + 'static,
{
  let value = match serde_json::from_slice::<Value>(&body) {
    Ok(value) => value,
    Err(e) => return Json(RpcResponse::new(Value::Null, Err(ApiError::Parse(e.to_string())))),
  };
  let id = value.get("id").cloned().unwrap_or(Value::Null);
  let request = match serde_json::from_value::<RpcRequest>(value) {
    Ok(request) => request,
    Err(e) => {
      return Json(RpcResponse::new(
        id,
        Err(ApiError::InvalidRequest(e.to_string())),
      ))
    }
  };

  log::debug!("rpc {} {}", request.method, request.params);
  let result = call(&state, request.method, request.params).await;
  Json(RpcResponse::new(request.id, result))
}
