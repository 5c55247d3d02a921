use clap::Parser;
use gridbook::{Config, app};

/// Serve the sheet editor to a browser.
#[derive(Parser, Debug)]
#[command(name = "gridbook-web", version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::info!(
        "Starting web server for sheet `{}` in {}",
        cli.config.storage_key,
        cli.config.storage_dir.display()
    );
    app::run(cli.config).await
}
