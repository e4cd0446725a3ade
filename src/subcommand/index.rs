use crate::{
  config::Config,
  datastore::sqlite::SqliteStorage,
  index::{
    self,
    fetcher::{BtcFetcher, EvmFetcher},
    BlockSource, IndexOptions,
  },
  protocol::ChainGroup,
  Result,
};
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs the indexing pipeline until `cancel` fires or a stage fails.
pub(crate) async fn run(config: Config, cancel: CancellationToken) -> Result {
  let options = IndexOptions::new(&config)?;
  let storage = SqliteStorage::open(&config.database.dsn, config.database.enable_log)
    .with_context(|| format!("failed to open database {}", config.database.dsn))?;

  let source: Arc<dyn BlockSource> = match config.chain.chain_group {
    ChainGroup::Evm => Arc::new(EvmFetcher::new(&config.chain, &config.filters)?),
    ChainGroup::Btc => Arc::new(BtcFetcher::new(&config.chain, options.workers)?),
  };

  index::run(options, source, Arc::new(storage), cancel).await
}
