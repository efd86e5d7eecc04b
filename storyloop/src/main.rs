//! Storyloop: a choose-your-path story told by a cynical AI narrator.
//!
//! Reads player input line by line from stdin and prints the story to
//! stdout. Logs go to stderr and are controlled with `RUST_LOG`.
//!
//! ```bash
//! cargo run -p storyloop -- --offline --seed 7
//! ```

mod headless;

use clap::Parser;
use std::path::PathBuf;
use storyloop_core::StoryConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "storyloop", version, about = "A choose-your-path story with an AI narrator")]
struct Args {
    /// Never contact the provider, even if ANTHROPIC_API_KEY is set.
    #[arg(long)]
    offline: bool,

    /// Directory holding the saved session.
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Claude model to narrate with.
    #[arg(long)]
    model: Option<String>,

    /// Seed for the offline narrator.
    #[arg(long)]
    seed: Option<u64>,

    /// Sampling temperature between 0 and 1.
    #[arg(long)]
    temperature: Option<f32>,
}

impl Args {
    /// Layer command-line flags over the environment.
    fn apply(self, mut config: StoryConfig) -> StoryConfig {
        if self.offline {
            config = config.offline(true);
        }
        if let Some(dir) = self.save_dir {
            config = config.with_save_dir(dir);
        }
        if let Some(model) = self.model {
            config = config.with_model(model);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Some(temperature) = args.temperature {
        anyhow::ensure!(
            (0.0..=1.0).contains(&temperature),
            "--temperature must be between 0 and 1, got {temperature}"
        );
    }

    let config = args.apply(StoryConfig::from_env()?);
    let offline = config.is_offline();
    let session = config.open_session().await?;

    headless::run_headless(session, offline).await
}
