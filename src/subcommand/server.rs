use self::{api::ApiState, cache::TtlCache};
use crate::{config::Config, datastore::sqlite::SqliteStorage, Result};
use anyhow::Context;
use axum::{routing::post, Router};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

mod api;
mod cache;
mod error;

const MIB: usize = 1024 * 1024;

fn router(state: Arc<ApiState<SqliteStorage>>) -> Router {
  Router::new()
    .route("/", post(api::handle::<SqliteStorage>))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// Serves the read API until `cancel` fires.
pub(crate) async fn run(config: Config, cancel: CancellationToken) -> Result {
  let addr: SocketAddr = config
    .server
    .listen
    .parse()
    .with_context(|| format!("invalid listen address {}", config.server.listen))?;
  let storage = SqliteStorage::open(&config.database.dsn, config.database.enable_log)
    .with_context(|| format!("failed to open database {}", config.database.dsn))?;

  let cache = Arc::new(TtlCache::new(
    Duration::from_secs(config.server.cache_ttl),
    usize::try_from(config.server.cache_size)
      .unwrap_or(usize::MAX)
      .saturating_mul(MIB),
  ));
  let sweeper = tokio::spawn(cache::run_sweeper(cache.clone(), cancel.clone()));

  let state = Arc::new(ApiState {
    chain: config.chain.chain_name.clone(),
    storage: Arc::new(storage),
    cache,
  });

  log::info!("read api listening on {addr}");
  let shutdown = cancel.clone();
  let served = axum::Server::try_bind(&addr)
    .with_context(|| format!("failed to bind {addr}"))?
    .serve(router(state).into_make_service())
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await;

  cancel.cancel();
  sweeper.await?;
  served.context("read api failed")?;
  log::info!("read api stopped");
  Ok(())
}
