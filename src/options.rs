use crate::{config::Config, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Clone, Debug, Parser)]
pub(crate) struct Options {
  #[arg(
    long,
    short,
    default_value = "config.yaml",
    help = "Load configuration from <CONFIG>."
  )]
  pub(crate) config: PathBuf,
  #[arg(long, help = "Override `log_level` of the config file.")]
  pub(crate) log_level: Option<String>,
  #[arg(long, help = "Write logs to <LOG_DIR> instead of `log_path`.")]
  pub(crate) log_dir: Option<PathBuf>,
}

impl Options {
  /// Reads the config file and applies command line overrides.
  pub(crate) fn load_config(&self) -> Result<Config> {
    let mut config = Config::load(&self.config)?;
    if let Some(level) = &self.log_level {
      config.log_level = level.clone();
    }
    if let Some(dir) = &self.log_dir {
      config.log_path = dir.to_string_lossy().into_owned();
    }
    Ok(config)
  }

  pub(crate) fn log_dir(config: &Config) -> Result<PathBuf> {
    let dir = PathBuf::from(&config.log_path);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
  }
}
