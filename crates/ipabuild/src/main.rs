use anyhow::Result;
use clap::Parser;
use ipabuild::{Cli, run};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    run(cli)
}

fn load_dotenv() {
    let _ = dotenvy::from_path(".env.local");
}
