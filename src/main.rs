use chunkguard::{commands, config, logging};

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "chunkguard")]
#[command(about = "Resilient code-bundle delivery: network-first caching with stand-in scripts")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/chunkguard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin the bundles are served from
  #[arg(long)]
  origin: Option<Url>,

  /// Cache database path
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command-line overrides
  if let Some(origin) = args.origin {
    config.origin = Some(origin);
  }
  if let Some(db) = args.db {
    config.cache.path = Some(db);
  }

  let _log_guard = logging::init(config.log_file.as_deref())?;

  commands::run(args.command, &config).await
}
