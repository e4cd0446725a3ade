use crate::Result;
use anyhow::{anyhow, Context};
use log::LevelFilter;
use log4rs::{
  append::{
    console::ConsoleAppender,
    rolling_file::{
      policy::compound::{
        roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
      },
      RollingFileAppender,
    },
  },
  config::{Appender, Config, Root},
  encode::pattern::PatternEncoder,
};
use std::{path::Path, str::FromStr};

const LOG_FILE: &str = "indexer.log";
const ARCHIVE_PATTERN: &str = "indexer.{}.log.gz";
const ARCHIVE_WINDOWS: u32 = 10;
const ROLL_SIZE: u64 = 100 * 1024 * 1024;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:<5})} [{T}] {t} - {m}{n}";

fn build_config(level: LevelFilter, log_dir: &Path) -> Result<Config> {
  let console = ConsoleAppender::builder()
    .encoder(Box::new(PatternEncoder::new(PATTERN)))
    .build();

  let roller = FixedWindowRoller::builder()
    .build(
      &log_dir.join(ARCHIVE_PATTERN).to_string_lossy(),
      ARCHIVE_WINDOWS,
    )
    .map_err(|e| anyhow!("invalid log archive pattern: {e}"))?;
  let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
  let file = RollingFileAppender::builder()
    .encoder(Box::new(PatternEncoder::new(PATTERN)))
    .build(log_dir.join(LOG_FILE), Box::new(policy))
    .with_context(|| format!("failed to open log file in {}", log_dir.display()))?;

  Config::builder()
    .appender(Appender::builder().build("stdout", Box::new(console)))
    .appender(Appender::builder().build("file", Box::new(file)))
    .build(
      Root::builder()
        .appender("stdout")
        .appender("file")
        .build(level),
    )
    .context("invalid logger config")
}

pub(crate) fn parse_level(level: &str) -> Result<LevelFilter> {
  LevelFilter::from_str(level.trim()).map_err(|_| anyhow!("invalid log level {level}"))
}

/// Installs the console and rolling file loggers.
pub(crate) fn init(level: &str, log_dir: &Path) -> Result {
  let config = build_config(parse_level(level)?, log_dir)?;
  log4rs::init_config(config).context("failed to install logger")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_level() {
    assert_eq!(parse_level("info").unwrap(), LevelFilter::Info);
    assert_eq!(parse_level(" DEBUG ").unwrap(), LevelFilter::Debug);
    assert!(parse_level("fatal").is_err());
  }

  #[test]
  fn test_build_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_config(LevelFilter::Warn, dir.path()).unwrap();
    assert_eq!(config.root().level(), LevelFilter::Warn);
    assert_eq!(config.appenders().len(), 2);
    assert!(dir.path().join(LOG_FILE).exists());
  }
}
