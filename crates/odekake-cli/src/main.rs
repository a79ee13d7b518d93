use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use odekake::output::read_root_document;
use odekake::{Registry, ScrapeError, VenueScraper, report_fatal, validate_final_data};

const DEFAULT_CONFIG_PATH: &str = "venues.json";
const DEFAULT_DATA_DIR: &str = "data/venues";

#[derive(Parser)]
#[command(name = "odekake")]
#[command(about = "Scrapes venue event calendars into per-venue JSON files", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        short = 'c',
        long,
        global = true,
        help = "Venue registry file [default: $ODEKAKE_CONFIG or venues.json]"
    )]
    config: Option<PathBuf>,

    #[arg(
        short = 'd',
        long,
        global = true,
        help = "Directory venue JSON files are written to [default: $ODEKAKE_DATA_DIR or data/venues]"
    )]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the venues in the registry
    List,
    /// Scrape one venue and replace its JSON file
    Run {
        #[arg(help = "Venue id as listed in the registry")]
        venue_id: String,
    },
    /// Validate an existing venue JSON file with the strict event checks
    Check {
        #[arg(help = "Path to a venue JSON file")]
        path: PathBuf,

        #[arg(long, default_value_t = 1, help = "Minimum number of events expected")]
        min_events: usize,
    },
}

fn path_from_env(flag: Option<PathBuf>, var: &str, default: &str) -> PathBuf {
    flag.or_else(|| std::env::var_os(var).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .target(env_logger::Target::Stderr)
        .init();

    let config_path = path_from_env(cli.config, "ODEKAKE_CONFIG", DEFAULT_CONFIG_PATH);
    let data_dir = path_from_env(cli.data_dir, "ODEKAKE_DATA_DIR", DEFAULT_DATA_DIR);

    match cli.command {
        Commands::List => match Registry::load(&config_path) {
            Ok(registry) => {
                if registry.venues().is_empty() {
                    println!("No venues configured in {}.", config_path.display());
                }
                for (i, venue) in registry.venues().iter().enumerate() {
                    println!("{:>3}. {:<24} {} <{}>", i + 1, venue.id, venue.name, venue.url);
                }
                ExitCode::SUCCESS
            }
            Err(e) => report_fatal("[list]", &e),
        },

        Commands::Run { venue_id } => {
            let prefix = format!("[{venue_id}]");
            match run_venue(&config_path, data_dir, &venue_id).await {
                Ok(summary) => {
                    println!("{summary}");
                    ExitCode::SUCCESS
                }
                Err(e) => report_fatal(&prefix, &e),
            }
        }

        Commands::Check { path, min_events } => {
            let checked = read_root_document(&path).await.and_then(|document| {
                validate_final_data(&document.events, min_events)?;
                Ok(document)
            });
            match checked {
                Ok(document) => {
                    println!(
                        "{}: {} event(s) OK, last success {}",
                        document.venue_id,
                        document.events.len(),
                        document.last_success_at
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => report_fatal("[check]", &e),
            }
        }
    }
}

async fn run_venue(
    config_path: &std::path::Path,
    data_dir: PathBuf,
    venue_id: &str,
) -> Result<odekake::FinalizeSummary, ScrapeError> {
    let registry = Registry::load(config_path)?;
    let venue = registry.get(venue_id).ok_or_else(|| {
        ScrapeError::Config(format!(
            "Unknown venue id '{venue_id}' (see `odekake list`)"
        ))
    })?;

    let scraper = VenueScraper::new(data_dir)?;
    scraper.run(venue).await
}
