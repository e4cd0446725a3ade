use crate::{protocol::ChainGroup, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
  pub chain_name: String,
  pub chain_group: ChainGroup,
  pub rpc: String,
  pub username: String,
  pub password: String,
  pub ord_rpc: String,
  pub testnet: bool,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      chain_name: String::new(),
      chain_group: ChainGroup::Evm,
      rpc: String::new(),
      username: String::new(),
      password: String::new(),
      ord_rpc: String::new(),
      testnet: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub from_block: u64,
  pub scan_limit: u64,
  pub delayed_scan_number: u64,
  pub batch_workers: usize,
  pub listen: String,
  /// Seconds a read API response stays cached.
  pub cache_ttl: u64,
  /// Read API cache budget in MiB.
  pub cache_size: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      from_block: 0,
      scan_limit: 2,
      delayed_scan_number: 0,
      batch_workers: 4,
      listen: "127.0.0.1:8080".to_string(),
      cache_ttl: 10,
      cache_size: 64,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Whitelist {
  pub protocols: Vec<String>,
  pub ticks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
  pub whitelist: Whitelist,
  /// Hex topics of the backfill log filter; the exchange topics when empty.
  pub event_topics: Vec<String>,
  /// Hex method selectors whose logs are decoded as exchanges; all when
  /// empty.
  pub exchange_selectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  #[serde(rename = "type")]
  pub kind: String,
  pub dsn: String,
  pub enable_log: bool,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      kind: "sqlite".to_string(),
      dsn: "indexer.db".to_string(),
      enable_log: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub chain: ChainConfig,
  pub server: ServerConfig,
  pub filters: FiltersConfig,
  pub database: DatabaseConfig,
  pub log_level: String,
  pub log_path: String,
  pub profile_enabled: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      chain: ChainConfig::default(),
      server: ServerConfig::default(),
      filters: FiltersConfig::default(),
      database: DatabaseConfig::default(),
      log_level: "info".to_string(),
      log_path: "logs".to_string(),
      profile_enabled: false,
    }
  }
}

impl Config {
  pub fn load(path: &Path) -> Result<Self> {
    let text = fs::read_to_string(path)
      .with_context(|| format!("failed to read config {}", path.display()))?;
    Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
  }

  pub fn parse(text: &str) -> Result<Self> {
    let config: Self = serde_yaml::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result {
    if self.chain.chain_name.trim().is_empty() {
      bail!("chain.chain_name is required");
    }
    if self.chain.rpc.trim().is_empty() {
      bail!("chain.rpc is required");
    }
    if self.chain.chain_group == ChainGroup::Btc && self.chain.ord_rpc.trim().is_empty() {
      bail!("chain.ord_rpc is required for btc chains");
    }
    if self.database.kind != "sqlite" {
      bail!("unsupported database type {}", self.database.kind);
    }
    if self.server.scan_limit == 0 {
      bail!("server.scan_limit must be positive");
    }
    if self.server.batch_workers == 0 {
      bail!("server.batch_workers must be positive");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_defaults() {
    let config = Config::parse(
      r#"
chain:
  chain_name: avalanche
  chain_group: evm
  rpc: http://127.0.0.1:9650/ext/bc/C/rpc
"#,
    )
    .unwrap();
    assert_eq!(config.chain.chain_group, ChainGroup::Evm);
    assert_eq!(config.server.scan_limit, 2);
    assert_eq!(config.server.batch_workers, 4);
    assert_eq!(config.server.delayed_scan_number, 0);
    assert_eq!(config.server.listen, "127.0.0.1:8080");
    assert_eq!(config.database.kind, "sqlite");
    assert_eq!(config.log_level, "info");
    assert!(config.filters.whitelist.ticks.is_empty());
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
chain:
  chain_name: bitcoin
  chain_group: btc
  rpc: http://127.0.0.1:8332
  username: user
  password: pass
  ord_rpc: http://127.0.0.1:80
  testnet: true
server:
  from_block: 779832
  scan_limit: 10
  delayed_scan_number: 3
  batch_workers: 8
filters:
  whitelist:
    protocols: [brc-20]
    ticks: [ordi]
database:
  type: sqlite
  dsn: /tmp/indexer.db
  enable_log: true
log_level: debug
log_path: /tmp/logs
profile_enabled: true
"#,
    )
    .unwrap();
    assert_eq!(config.chain.chain_group, ChainGroup::Btc);
    assert!(config.chain.testnet);
    assert_eq!(config.server.from_block, 779832);
    assert_eq!(config.filters.whitelist.protocols, vec!["brc-20".to_string()]);
    assert!(config.database.enable_log);
    assert!(config.profile_enabled);
  }

  #[test]
  fn test_invalid_config() {
    assert!(Config::parse("chain:\n  chain_name: x\n  rpc: http://a\n  chain_group: sol\n").is_err());
    assert!(Config::parse("chain:\n  chain_name: x\n  rpc: http://a\n  chain_group: btc\n").is_err());
    assert!(Config::parse(
      "chain:\n  chain_name: x\n  rpc: http://a\ndatabase:\n  type: mysql\n"
    )
    .is_err());
    assert!(Config::parse("chain:\n  rpc: http://a\n").is_err());
  }
}
