use clap::Parser;
use pulp_courier::cli::{exit_code, run, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        tracing::error!(%error, "command failed");
        std::process::exit(exit_code(&error));
    }
}
