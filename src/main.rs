mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lottoharvest::config::Config;
use lottoharvest::error::{Error, HarvestErrorTrait};

use commands::{CollectArgs, HistoricalArgs};

#[derive(Parser)]
#[command(
    name = "lottoharvest",
    version,
    about = "Lottery draw results collector",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors; do not print the summary
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format (pretty, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect latest, single-date or windowed results
    Collect {
        /// Single jurisdiction code (e.g. NY)
        #[arg(long)]
        state: Option<String>,

        /// Comma-separated jurisdiction codes (e.g. NY,CA,CO)
        #[arg(long)]
        states: Option<String>,

        /// Date to collect (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["year", "month", "day"])]
        date: Option<String>,

        /// Year to collect (with --month and --day)
        #[arg(long)]
        year: Option<i32>,

        /// Month to collect (with --year and --day)
        #[arg(long)]
        month: Option<u32>,

        /// Day to collect (with --year and --month)
        #[arg(long)]
        day: Option<u32>,

        /// Collect a window of dates ending at the given date (or today)
        #[arg(long)]
        week: bool,

        /// Window length in days
        #[arg(long)]
        days_back: Option<u32>,

        /// Save results and attempts to the database (default)
        #[arg(long, overrides_with = "no_save_to_db")]
        save_to_db: bool,

        /// Extract and report without writing to the database
        #[arg(long)]
        no_save_to_db: bool,

        /// Write the JSON summary to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Walk back through history with adaptive termination
    Historical {
        /// Comma-separated jurisdiction codes; all stored jurisdictions when omitted
        #[arg(long)]
        states: Option<String>,

        /// First (newest) date to visit (YYYY-MM-DD, default today)
        #[arg(long)]
        start: Option<String>,

        /// Maximum dates visited per jurisdiction
        #[arg(long)]
        max_days: Option<u32>,

        /// Consecutive empty dates that end a jurisdiction
        #[arg(long)]
        max_empty_days: Option<u32>,

        /// Refresh the jurisdiction list from the site menu first
        #[arg(long)]
        discover: bool,

        /// Extract and report without writing to the database
        #[arg(long)]
        no_save_to_db: bool,

        /// Write the JSON summary to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read the site's jurisdiction menu into the database
    Discover,

    /// Create the database schema
    InitDb,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    if let Err(e) = setup_tracing(&format, &config.logging.level, cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            match e.downcast_ref::<Error>() {
                Some(err) => tracing::error!(
                    category = err.category().as_str(),
                    recoverable = err.is_recoverable(),
                    "{e:#}"
                ),
                None => tracing::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Run the selected command; `Ok(false)` means no jurisdiction succeeded
async fn run(cli: Cli, config: Config) -> Result<bool> {
    let quiet = cli.quiet;

    match cli.command {
        Commands::Collect {
            state,
            states,
            date,
            year,
            month,
            day,
            week,
            days_back,
            save_to_db: _,
            no_save_to_db,
            output,
        } => {
            let args = CollectArgs {
                state,
                states,
                date,
                year,
                month,
                day,
                week,
                days_back,
                save_to_db: !no_save_to_db,
                output,
                quiet,
            };
            let summary = commands::collect(config, args).await?;
            Ok(summary.success)
        }

        Commands::Historical {
            states,
            start,
            max_days,
            max_empty_days,
            discover,
            no_save_to_db,
            output,
        } => {
            let args = HistoricalArgs {
                states,
                start,
                max_days,
                max_empty_days,
                discover,
                save_to_db: !no_save_to_db,
                output,
                quiet,
            };
            let summary = commands::historical(config, args).await?;
            Ok(summary.success)
        }

        Commands::Discover => {
            let found = commands::discover(&config).await?;
            if !quiet {
                println!("Discovered {found} jurisdictions");
            }
            Ok(found > 0)
        }

        Commands::InitDb => {
            commands::init_db(&config).await?;
            Ok(true)
        }
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool, quiet: bool) -> Result<()> {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        level
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("lottoharvest={default_level},warn"))
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
