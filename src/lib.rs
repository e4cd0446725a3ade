#![allow(clippy::too_many_arguments, clippy::type_complexity)]
#![deny(
  clippy::cast_lossless,
  clippy::cast_possible_truncation,
  clippy::cast_possible_wrap,
  clippy::cast_sign_loss
)]

use {
  self::{arguments::Arguments, options::Options},
  anyhow::Error,
  clap::Parser,
  once_cell::sync::Lazy,
  std::{
    env, process,
    sync::atomic::{self, AtomicBool},
  },
  tokio_util::sync::CancellationToken,
};

mod arguments;
pub mod cache;
pub mod config;
pub mod datastore;
pub mod index;
mod logger;
mod options;
pub mod protocol;
pub mod rpc;
mod subcommand;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);
static SHUTDOWN: Lazy<CancellationToken> = Lazy::new(CancellationToken::new);

fn run(arguments: Arguments) -> Result {
  let config = arguments.options.load_config()?;
  let log_dir = Options::log_dir(&config)?;
  if let Err(e) = logger::init(&config.log_level, &log_dir) {
    panic!("initialize logger error: {e:#}");
  }
  log::info!(
    "starting {} for {} ({})",
    env!("CARGO_PKG_NAME"),
    config.chain.chain_name,
    config.chain.chain_group.as_str()
  );

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()?;
  runtime.block_on(arguments.subcommand.run(config, SHUTDOWN.clone()))
}

pub fn main() {
  let arguments = Arguments::parse();

  if let Err(e) = ctrlc::set_handler(move || {
    if SHUTTING_DOWN.fetch_or(true, atomic::Ordering::Relaxed) {
      process::exit(1);
    }

    println!("Shutting down gracefully. Press <CTRL-C> again to shutdown immediately.");
    SHUTDOWN.cancel();
  }) {
    eprintln!("error setting <CTRL-C> handler: {e}");
    process::exit(1);
  }

  if let Err(err) = run(arguments) {
    log::error!("{err:#}");
    eprintln!("error: {err}");
    err
      .chain()
      .skip(1)
      .for_each(|cause| eprintln!("because: {cause}"));
    if env::var_os("RUST_BACKTRACE")
      .map(|val| val == "1")
      .unwrap_or_default()
    {
      eprintln!("{}", err.backtrace());
    }

    process::exit(1);
  }
}
