mod cli;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pglocks::config::Config;
use pglocks::infrastructure::{observability, persistence::Database};
use pglocks::services::AdvisoryLockService;

use cli::{Cli, Command, HoldArgs, RunArgs};

/// Lock denied in fail-fast mode (EX_TEMPFAIL).
const EXIT_DENIED: u8 = 75;
const EXIT_ERROR: u8 = 70;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::from_env()?;
    observability::init(&config).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let db = Database::connect(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    let service = AdvisoryLockService::new(db, config.lock.clone());

    match cli.command {
        Command::Probe(args) => {
            let identifier = args.id.identifier()?;
            if service.is_locked(identifier.clone()).await? {
                println!("{} locked", identifier);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{} unlocked", identifier);
                Ok(ExitCode::from(1))
            }
        }
        Command::Hold(args) => hold(&service, args).await,
        Command::Run(args) => run_command(&service, args).await,
    }
}

async fn hold(service: &AdvisoryLockService, args: HoldArgs) -> anyhow::Result<ExitCode> {
    let identifier = args.id.identifier()?;
    let seconds = args.seconds;

    let held = service
        .with_lock(identifier.clone(), args.mode.options(), async move {
            println!("{} held", identifier);
            match seconds {
                Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                }
            }
        })
        .await?;

    Ok(match held {
        Some(()) => ExitCode::SUCCESS,
        None => {
            println!("denied");
            ExitCode::from(EXIT_DENIED)
        }
    })
}

async fn run_command(service: &AdvisoryLockService, args: RunArgs) -> anyhow::Result<ExitCode> {
    let identifier = args.id.identifier()?;
    let (program, rest) = args
        .command
        .split_first()
        .context("No command given")?;

    let mut child = tokio::process::Command::new(program);
    child.args(rest).kill_on_drop(true);

    let status = service
        .with_lock(identifier, args.mode.options(), async move { child.status().await })
        .await?;

    match status {
        Some(status) => {
            let status = status.with_context(|| format!("Failed to run {}", program))?;
            let code = status.code().unwrap_or(1).clamp(0, 255) as u8;
            Ok(ExitCode::from(code))
        }
        None => {
            eprintln!("Lock is held elsewhere, not running {}", program);
            Ok(ExitCode::from(EXIT_DENIED))
        }
    }
}
