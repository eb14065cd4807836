use chrono::Utc;
use clap::Parser;
use stockflow::cli::Cli;
use stockflow::{commands, obs, CliError};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    obs::init_tracing("info", cli.log_format)?;
    obs::init_metrics(cli.metrics_addr.as_deref())?;

    let config = commands::load_config(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let output = commands::execute(cli.command, config, Utc::now()).await?;
    if !output.is_empty() {
        print!("{output}");
        if !output.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
