//! Battle - Operator Tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "battle-tools")]
#[command(about = "Operator tools for Battle match hosts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a rules file or a directory of them
    Validate {
        /// Rules file or directory
        #[arg(default_value = "assets/rules")]
        path: PathBuf,
    },

    /// Play a replay back and check it against its recorded hashes
    Verify {
        /// Replay file
        path: PathBuf,
    },

    /// Record an idle duel to a replay file
    Record {
        /// Match seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Ticks to record
        #[arg(long, default_value = "100")]
        ticks: u64,

        /// Output file
        #[arg(short, long, default_value = "duel.replay")]
        output: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating rules in: {}", path.display());
            match battle_tools::validate::validate_rules_path(&path) {
                Ok(reports) if reports.iter().all(|r| r.error.is_none()) => {
                    tracing::info!("Validation passed ({} files)", reports.len());
                }
                Ok(reports) => {
                    let failed = reports.iter().filter(|r| r.error.is_some()).count();
                    tracing::error!("Validation failed: {failed} of {} files", reports.len());
                    std::process::exit(1);
                }
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Verify { path } => match battle_tools::replay::verify_replay(&path) {
            Ok(report) => {
                tracing::info!(
                    "Replay ok: seed {}, {} ticks, {} orders, result {:?}",
                    report.seed,
                    report.ticks,
                    report.orders,
                    report.result
                );
            }
            Err(e) => {
                tracing::error!("Replay verification failed: {e}");
                std::process::exit(1);
            }
        },
        Commands::Record {
            seed,
            ticks,
            output,
        } => match battle_tools::replay::record_duel(seed, ticks, &output) {
            Ok(log) => tracing::info!("Recorded {} ticks to {}", log.duration(), output.display()),
            Err(e) => {
                tracing::error!("Recording failed: {e}");
                std::process::exit(1);
            }
        },
    }
}
