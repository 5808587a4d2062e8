//! Deck: a terminal audio player.
//!
//! Loads local files (or a directory of them) into memory, decodes, resamples to the output
//! device rate and plays them through CPAL. Playback is driven by single-letter commands on
//! stdin; `h` prints the list.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deck::cli::Args;
use deck::config::DeckConfig;
use deck::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,deck=info,deck_engine=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = DeckConfig::from_args(&args)?;
    tracing::info!(source = ?config.source, device = ?config.device, "starting deck");
    runtime::run(config)
}
