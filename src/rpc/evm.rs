use super::{with_retry, RpcError};
use crate::Result;
use anyhow::{bail, Context};
use std::str::FromStr;
use web3::{
  transports::Http,
  types::{
    Block, BlockId, BlockNumber, FilterBuilder, Log, Transaction, TransactionReceipt, H256, U64,
  },
  Web3,
};

impl From<web3::Error> for RpcError {
  fn from(error: web3::Error) -> Self {
    match error {
      web3::Error::Rpc(error) => Self::classify(error.message),
      other => Self::classify(other.to_string()),
    }
  }
}

/// Puts basic-auth credentials into an endpoint url.
pub(crate) fn with_credentials(url: &str, username: &str, password: &str) -> Result<String> {
  if username.is_empty() {
    return Ok(url.to_string());
  }
  let Some((scheme, rest)) = url.split_once("://") else {
    bail!("invalid rpc url {url}");
  };
  Ok(format!("{scheme}://{username}:{password}@{rest}"))
}

/// Account-chain node client.
#[derive(Debug, Clone)]
pub struct EvmClient {
  web3: Web3<Http>,
}

impl EvmClient {
  pub fn new(url: &str, username: &str, password: &str) -> Result<Self> {
    let url = with_credentials(url, username, password)?;
    let transport = Http::new(&url).context("failed to create evm transport")?;
    Ok(Self {
      web3: Web3::new(transport),
    })
  }

  pub async fn chain_id(&self) -> Result<u64, RpcError> {
    with_retry("eth_chainId", move || async move {
      Ok(self.web3.eth().chain_id().await?.low_u64())
    })
    .await
  }

  pub async fn block_number(&self) -> Result<u64, RpcError> {
    with_retry("eth_blockNumber", move || async move {
      Ok(self.web3.eth().block_number().await?.as_u64())
    })
    .await
  }

  pub async fn block_with_txs(&self, number: u64) -> Result<Block<Transaction>, RpcError> {
    with_retry("eth_getBlockByNumber", move || async move {
      self
        .web3
        .eth()
        .block_with_txs(BlockId::Number(BlockNumber::Number(U64::from(number))))
        .await?
        .ok_or(RpcError::NoResult)
    })
    .await
  }

  /// Logs of blocks `[from, to)` whose first topic is any of `topics`.
  pub async fn logs(&self, from: u64, to: u64, topics: &[H256]) -> Result<Vec<Log>, RpcError> {
    let filter = FilterBuilder::default()
      .from_block(BlockNumber::Number(U64::from(from)))
      .to_block(BlockNumber::Number(U64::from(to.saturating_sub(1))))
      .topics(Some(topics.to_vec()), None, None, None)
      .build();
    let filter = &filter;
    with_retry("eth_getLogs", move || async move {
      Ok(self.web3.eth().logs(filter.clone()).await?)
    })
    .await
  }

  pub async fn receipt(&self, hash: &str) -> Result<TransactionReceipt, RpcError> {
    let hash = H256::from_str(hash.trim_start_matches("0x"))
      .map_err(|e| RpcError::Transport(format!("invalid tx hash {hash}: {e}")))?;
    with_retry("eth_getTransactionReceipt", move || async move {
      self
        .web3
        .eth()
        .transaction_receipt(hash)
        .await?
        .ok_or(RpcError::NoResult)
    })
    .await
  }
}
