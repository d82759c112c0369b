use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use portal_keeper::RunContext;
use portal_keeper::config::{Credentials, Settings};

/// Possum portal keeper: converts profitable rewards and executes ready orders.
#[derive(Parser, Debug)]
#[command(name = "portal-keeper")]
struct Cli {
    /// TOML settings file; built-in Arbitrum defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log file written alongside stdout.
    #[arg(long, global = true, default_value = "portal-keeper.log")]
    log_file: PathBuf,

    /// Evaluate everything but send no transactions.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert portal rewards worth more than the reference price plus margin.
    Convert,
    /// Execute every executable order in the arbitrage registry.
    Arbitrage,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_file) {
        eprintln!("failed to initialise logging: {e:#}");
        return ExitCode::from(2);
    }

    let ctx = match build_context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %format!("{e:#}"), "configuration error");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Convert => {
            info!(dry_run = ctx.settings.dry_run, "starting conversion run");
            portal_keeper::convert(&ctx).await
        }
        Commands::Arbitrage => {
            info!(dry_run = ctx.settings.dry_run, "starting arbitrage run");
            portal_keeper::arbitrage(&ctx).await
        }
    };

    match result {
        Ok(report) => {
            report.log_summary();
            println!("{report}");
            if report.has_failures() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            ExitCode::from(2)
        }
    }
}

fn build_context(cli: &Cli) -> anyhow::Result<RunContext> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.dry_run |= cli.dry_run;
    let credentials = Credentials::from_env()?;
    Ok(RunContext { settings, credentials })
}

fn init_logging(log_file: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portal_keeper=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .init();
    Ok(())
}
