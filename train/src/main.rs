use anyhow::{Context, Result};
use std::{env, num::NonZeroUsize, path::PathBuf, sync::Arc};
use structopt::StructOpt;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use train::config::{AdapterConfig, Config};

#[derive(Debug, Clone, StructOpt)]
/// Train a multi-spectral channel adapter against a frozen CLIP backbone
struct Args {
    #[structopt(long, default_value = "train.json5")]
    /// configuration file
    pub config_file: PathBuf,
    #[structopt(long)]
    /// adapter variant: 1 = linear projection, 2 = nonlinear projection
    pub adapter: u32,
    #[structopt(long)]
    /// maximum number of training epochs
    pub max_epochs: usize,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse arguments; the selectors are validated before any data loading
    let Args {
        config_file,
        adapter,
        max_epochs,
    } = Args::from_args();
    let adapter = AdapterConfig::from_selector(adapter)?;
    let max_epochs = NonZeroUsize::new(max_epochs).context("max epochs must be at least 1")?;

    let mut config = Config::open(&config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;
    config.model.adapter = adapter;
    config.training.max_epochs = max_epochs;

    train::start(Arc::new(config)).await?;

    Ok(())
}
