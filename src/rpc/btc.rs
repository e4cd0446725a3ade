use super::{with_retry, RpcError};
use crate::Result;
use anyhow::Context;
use bitcoin::{Block, BlockHash};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use std::sync::Arc;

impl From<bitcoincore_rpc::Error> for RpcError {
  fn from(error: bitcoincore_rpc::Error) -> Self {
    match error {
      bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(error)) => {
        Self::classify(error.message)
      }
      other => Self::classify(other.to_string()),
    }
  }
}

/// Utxo-chain node client. Calls block, so each one runs on the blocking
/// pool.
#[derive(Clone)]
pub struct BtcClient {
  client: Arc<Client>,
}

impl BtcClient {
  pub fn new(url: &str, username: &str, password: &str) -> Result<Self> {
    let auth = if username.is_empty() {
      Auth::None
    } else {
      Auth::UserPass(username.to_string(), password.to_string())
    };
    let client = Client::new(url, auth)
      .with_context(|| format!("failed to connect to bitcoin core rpc at {url}"))?;
    Ok(Self {
      client: Arc::new(client),
    })
  }

  async fn call<T, F>(&self, method: &str, f: F) -> Result<T, RpcError>
  where
    T: Send + 'static,
    F: Fn(&Client) -> bitcoincore_rpc::Result<T> + Clone + Send + 'static,
  {
    with_retry(method, || {
      let client = self.client.clone();
      let f = f.clone();
      async move {
        tokio::task::spawn_blocking(move || f(&client))
          .await
          .map_err(|e| RpcError::Transport(e.to_string()))?
          .map_err(RpcError::from)
      }
    })
    .await
  }

  pub async fn block_count(&self) -> Result<u64, RpcError> {
    self.call("getblockcount", |client| client.get_block_count()).await
  }

  pub async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError> {
    self
      .call("getblockhash", move |client| client.get_block_hash(height))
      .await
  }

  pub async fn block(&self, hash: BlockHash) -> Result<Block, RpcError> {
    self
      .call("getblock", move |client| client.get_block(&hash))
      .await
  }
}
