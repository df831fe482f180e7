use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use jpx_flows::api::{GeminiClient, HttpFetcher, YahooClient};
use jpx_flows::chart::render_trend;
use jpx_flows::collectors::{investor_type, participants, sectors, shutai};
use jpx_flows::history::HistoryStore;
use jpx_flows::models::Config;

/// JPX investor flow collector
#[derive(Parser)]
#[command(name = "jpx-flows")]
#[command(version = "0.1.0")]
#[command(about = "Scrape JPX and nikkei225jp.com statistics into flat history files")]
#[command(long_about = "
Each subcommand is a single batch job: fetch the source page, find the latest
document, extract the figures and merge them into a CSV or JSON history file.

Settings come from the environment (or a .env file): JPX_INVESTOR_ARCHIVE_URL,
SHUTAI_URL, GEMINI_API_KEY, HISTORY_CSV, DEBUG_MODE and friends.

Examples:
  jpx-flows foreign-balance
  jpx-flows foreign-balance --locators locators.json
  jpx-flows shutai --debug
  jpx-flows sectors --sectors sectors.json
")]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Foreign-investor balance from the latest weekly Excel workbook
    ForeignBalance {
        /// JSON cell locator overriding the built-in balance lookup
        #[arg(long)]
        locators: Option<PathBuf>,
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        chart: Option<PathBuf>,
    },

    /// Foreign-investor balance from the latest PDF report, read by Gemini
    ForeignBalancePdf {
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        chart: Option<PathBuf>,
    },

    /// Weekly participation table from nikkei225jp.com
    Shutai {
        /// Overwrite the stored data instead of merging
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Latest daily derivatives volume by trading participant
    Participants {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Weekly sector returns joined with the foreign-investor flow
    Sectors {
        /// JSON list of {ticker, name, category}
        #[arg(long)]
        sectors: Option<PathBuf>,
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Redraw the trend chart from the balance history
    Chart {
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        chart: Option<PathBuf>,
        #[arg(long, default_value = investor_type::EXCEL_CHART_TITLE)]
        title: String,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "jpx_flows=debug" } else { "jpx_flows=info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn override_path(target: &mut PathBuf, value: Option<PathBuf>) {
    if let Some(value) = value {
        *target = value;
    }
}

async fn run(command: Command, mut config: Config) -> Result<()> {
    match command {
        Command::ForeignBalance { locators, history, chart } => {
            override_path(&mut config.history_csv, history);
            override_path(&mut config.trend_chart, chart);
            let locator = match locators {
                Some(path) => investor_type::load_locator(&path)?,
                None => investor_type::default_balance_locator(),
            };
            let fetcher = HttpFetcher::new(&config)?;
            investor_type::run_excel(&config, &fetcher, &locator, Local::now().date_naive()).await?;
        }
        Command::ForeignBalancePdf { history, chart } => {
            override_path(&mut config.history_csv, history);
            override_path(&mut config.trend_chart, chart);
            let gemini = GeminiClient::new(&config)?;
            let fetcher = HttpFetcher::new(&config)?;
            investor_type::run_pdf(&config, &fetcher, &gemini, Local::now().date_naive()).await?;
        }
        Command::Shutai { debug, output } => {
            override_path(&mut config.shutai_json, output);
            let fetcher = HttpFetcher::new(&config)?;
            shutai::run(&config, &fetcher, debug || config.debug_mode).await?;
        }
        Command::Participants { output } => {
            override_path(&mut config.participant_json, output);
            let fetcher = HttpFetcher::new(&config)?;
            participants::run(&config, &fetcher, Local::now().naive_local()).await?;
        }
        Command::Sectors { sectors: sector_file, history, output } => {
            override_path(&mut config.history_csv, history);
            override_path(&mut config.sector_json, output);
            let sector_list = sectors::load_sector_config(sector_file.as_deref())?;
            let yahoo = YahooClient::new(&config)?;
            sectors::run(&config, &yahoo, &sector_list, Local::now().naive_local()).await?;
        }
        Command::Chart { history, chart, title } => {
            override_path(&mut config.history_csv, history);
            override_path(&mut config.trend_chart, chart);
            let store = HistoryStore::load(&config.history_csv)?;
            render_trend(store.rows(), &config.trend_chart, &title)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("🚀 Starting jpx-flows");
    let config = Config::from_env()?;
    info!("📋 Configuration loaded");

    if let Err(e) = run(cli.command, config).await {
        error!("Job failed: {:#}", e);
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }

    info!("🎉 Done");
    Ok(())
}
