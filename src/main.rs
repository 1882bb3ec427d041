//! lobstore-rs binary: serves the LOB session surface over HTTP.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use lobstore_rs::{Args, Config, LobServer};

/// Log filter from `--debug`/`--silent`. `RUST_LOG` overrides both.
fn log_filter(args: &Args) -> EnvFilter {
    let level = match (args.debug, args.silent) {
        (true, _) => Level::DEBUG,
        (false, true) => Level::ERROR,
        (false, false) => Level::INFO,
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&args))
        .with_target(false)
        .compact()
        .try_init()?;

    // Create configuration from arguments
    let config = Config::from(args);

    // Opening the engine sweeps spill files left by an earlier run
    let server = LobServer::new(config)?;

    println!("lobstore-rs listening on {}", server.base_url());
    println!(
        "  spill directory: {}",
        server.database().config().spill_dir.display()
    );
    println!("  open a session:  curl -X POST {}/sessions", server.base_url());

    server.run().await
}
