use crate::{config::Config, Result};
use clap::Subcommand as ClapSubcommand;
use tokio_util::sync::CancellationToken;

mod index;
mod server;

#[derive(Debug, ClapSubcommand)]
pub(crate) enum Subcommand {
  #[command(about = "Index inscriptions of the configured chain")]
  Index,
  #[command(about = "Run the read api server")]
  Server,
}

impl Subcommand {
  pub(crate) async fn run(self, config: Config, cancel: CancellationToken) -> Result {
    match self {
      Self::Index => index::run(config, cancel).await,
      Self::Server => server::run(config, cancel).await,
    }
  }
}
