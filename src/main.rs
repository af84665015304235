//! gigelink - GigE camera link bring-up for Linux hosts
//!
//! Configures a link-local camera interface and discovers the camera on it.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use gigelink::cli::{Cli, Commands};
use gigelink::commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: cannot start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(cli));
    // Discovery scans cut off at their deadline may still be running
    runtime.shutdown_timeout(Duration::from_millis(500));

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    if let Commands::Version = cli.command {
        println!("gigelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    let config = commands::load_config(&cli.config, &cli.overrides.into())?;

    match cli.command {
        Commands::Setup {
            yes,
            no_persist,
            timeout,
        } => commands::setup::run(&config, yes, no_persist, timeout).await,
        Commands::Diagnose { json, timeout } => {
            commands::diagnose::run(&config, json, timeout).await
        }
        Commands::Interfaces => commands::interfaces::run(&config).await.map(|_| 0),
        Commands::Version => Ok(0),
    }
}
