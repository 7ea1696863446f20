use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use commands::{config, run, schedule};
use media_history_config::PathManager;
use media_history_models::{Category, Listing};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "reeltrend")]
#[command(about = "ReelTrend - Keep a running history of popular movies and TV shows")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Runs the pipeline once when no subcommand is given
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for a single pipeline run
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Category to fetch; repeat for several (defaults to the configured set)
    #[arg(long = "category", value_name = "CATEGORY")]
    pub categories: Vec<Category>,

    /// Only titles released within this many days before the run date
    #[arg(long, value_name = "DAYS")]
    pub lookback_days: Option<u32>,

    /// Popularity feed: discover (release window), trending_day or trending_week
    #[arg(long, value_name = "LISTING")]
    pub listing: Option<Listing>,

    /// Count the cast of this many top titles into sample_cast_counts_<date>.csv (0 disables)
    #[arg(long, value_name = "N")]
    pub cast_sample: Option<usize>,

    /// Upper bound on result pages per category
    #[arg(long, value_name = "N")]
    pub max_pages: Option<u32>,

    /// Date recorded for this run (YYYY-MM-DD, defaults to today in UTC)
    #[arg(long, value_name = "DATE")]
    pub run_date: Option<NaiveDate>,

    /// Directory for the exported files
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Fetch, merge and aggregate without writing any file
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge and export once
    #[command(long_about = "Fetch the currently popular titles, merge them into the stored history and rewrite the exported files. Exits with 0 on success, 1 on a fatal error and 2 when some categories could not be fetched.")]
    Run(RunArgs),

    /// Keep running and execute the pipeline on a cron schedule
    #[command(long_about = "Run the pipeline on the configured cron schedule (weekly by default). A tick that fires while the previous run is still active is skipped.")]
    Schedule {
        /// Six-field cron expression, seconds first (e.g. '0 0 6 * * Mon')
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Run once immediately before waiting for the first tick
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "no_startup_run")]
        startup_run: bool,

        /// Skip the startup run even if the configuration asks for it
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_run: bool,
    },

    /// Manage configuration and the API token
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (the token is masked)
    Show {
        /// Show the token unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },

    /// Store the API read access token
    #[command(long_about = "Store the API read access token in the credentials file. The TMDB_V4_TOKEN environment variable, when set, takes precedence over the stored value.")]
    SetToken {
        /// Token value (prompted without echo if omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let paths = PathManager::default();
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());

    // The scheduler is long-lived and logs to a rotating file
    let log_file = match cli.command {
        Some(Commands::Schedule { .. }) => Some(paths.scheduler_log_file()),
        _ => None,
    };
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run::run_once(args, &config_path, &paths, &output).await,
        Commands::Schedule {
            schedule,
            startup_run,
            no_startup_run,
        } => {
            let startup = if no_startup_run {
                Some(false)
            } else if startup_run {
                Some(true)
            } else {
                None
            };
            schedule::run_schedule(schedule, startup, &config_path, &paths, &output).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { cmd } => {
            config::run_config(cmd, &config_path, &paths, &output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
