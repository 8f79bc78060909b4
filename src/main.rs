use anyhow::Context;
use clap::Parser;
use dashbus::{
    cli::{self, Cli},
    config::Settings,
    logging::init_logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    cli.apply(&mut settings);

    let logging = init_logging(settings.logging.clone()).context("failed to initialize logging")?;
    let result = cli::run(cli, settings).await;
    logging.shutdown();
    result
}
