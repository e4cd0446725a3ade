use super::{with_retry, RpcError};
use crate::Result;
use anyhow::Context;
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

impl From<reqwest::Error> for RpcError {
  fn from(error: reqwest::Error) -> Self {
    if error.status() == Some(StatusCode::NOT_FOUND) {
      Self::NoResult
    } else {
      Self::classify(error.to_string())
    }
  }
}

/// One page of `/inscriptions/block/{height}/{page}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InscriptionsPage {
  #[serde(alias = "ids")]
  pub inscriptions: Vec<String>,
  #[serde(default)]
  pub more: bool,
}

/// Subset of `/inscription/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InscriptionInfo {
  pub address: Option<String>,
  pub content_type: Option<String>,
  /// `txid:vout:offset`
  pub satpoint: String,
}

impl InscriptionInfo {
  /// Splits the satpoint into `txid:vout` and the sat offset.
  pub fn location(&self) -> Option<(String, u64)> {
    let (outpoint, offset) = self.satpoint.rsplit_once(':')?;
    Some((outpoint.to_string(), offset.parse().ok()?))
  }
}

/// Subset of `/output/{txid}:{vout}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputInfo {
  pub value: u64,
  pub address: Option<String>,
}

/// Ordinal enumerator client.
#[derive(Debug, Clone)]
pub struct OrdClient {
  client: reqwest::Client,
  url: String,
}

impl OrdClient {
  pub fn new(url: &str) -> Result<Self> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
      header::ACCEPT,
      header::HeaderValue::from_static("application/json"),
    );
    let client = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .context("failed to build ord http client")?;
    Ok(Self {
      client,
      url: url.trim_end_matches('/').to_string(),
    })
  }

  async fn get(&self, path: &str) -> Result<reqwest::Response, RpcError> {
    Ok(
      self
        .client
        .get(format!("{}{path}", self.url))
        .send()
        .await?
        .error_for_status()?,
    )
  }

  pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, RpcError> {
    with_retry(path, move || async move {
      Ok(self.get(path).await?.bytes().await?.to_vec())
    })
    .await
  }

  pub async fn get_text(&self, path: &str) -> Result<String, RpcError> {
    with_retry(path, move || async move { Ok(self.get(path).await?.text().await?) }).await
  }

  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
    with_retry(path, move || async move { Ok(self.get(path).await?.json::<T>().await?) }).await
  }

  /// Height of the last block ord has indexed.
  pub async fn block_height(&self) -> Result<u64, RpcError> {
    parse_height(&self.get_text("/blockheight").await?)
  }

  pub async fn block_inscriptions(
    &self,
    height: u64,
    page: u32,
  ) -> Result<InscriptionsPage, RpcError> {
    self
      .get_json(&format!("/inscriptions/block/{height}/{page}"))
      .await
  }

  pub async fn content(&self, id: &str) -> Result<Vec<u8>, RpcError> {
    self.get_bytes(&format!("/content/{id}")).await
  }

  pub async fn inscription(&self, id: &str) -> Result<InscriptionInfo, RpcError> {
    self.get_json(&format!("/inscription/{id}")).await
  }

  pub async fn output(&self, txid: &str, vout: u32) -> Result<OutputInfo, RpcError> {
    self.get_json(&format!("/output/{txid}:{vout}")).await
  }
}

fn parse_height(text: &str) -> Result<u64, RpcError> {
  text
    .trim()
    .parse()
    .map_err(|_| RpcError::Transport(format!("invalid block height: {text:?}")))
}
