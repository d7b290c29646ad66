use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use c19s::cache::{FetchOutcome, KeyValueStore, SqliteStore};
use c19s::config::Config;
use c19s::connectivity::{ConnectivityProbe, HttpConnectivityProbe, StaticProbe};
use c19s::covid::{CachedCovidClient, CovidApiClient, HistoricalDays};

#[derive(Parser, Debug)]
#[command(name = "c19s")]
#[command(about = "A terminal client for COVID-19 statistics, with offline caching")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/c19s/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Country name, spelled as the API spells it (omit for the full list)
  country: Option<String>,

  /// Show the historical series instead of current statistics
  #[arg(long)]
  historical: bool,

  /// Days of history: 'all' or a number
  #[arg(long, default_value = "all", value_parser = HistoricalDays::from_str)]
  days: HistoricalDays,

  /// Bypass the cache freshness check and refetch
  #[arg(long)]
  refresh: bool,

  /// Skip connectivity checks and serve only cached data
  #[arg(long)]
  offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;

  let store: Arc<dyn KeyValueStore> = match &config.cache.path {
    Some(path) => Arc::new(SqliteStore::open_at(path)?),
    None => Arc::new(SqliteStore::open()?),
  };

  let probe: Arc<dyn ConnectivityProbe> = if args.offline {
    Arc::new(StaticProbe::new(false))
  } else {
    let probe = Arc::new(HttpConnectivityProbe::new(config.api.base_url.clone())?);
    probe.check_now().await;
    probe
  };

  let provider = CovidApiClient::new(&config)?;
  let client = CachedCovidClient::new(provider, store, probe)
    .with_max_age(Duration::from_secs(config.cache.max_age_secs));

  match args.country {
    Some(name) if args.historical => {
      let outcome = client.fetch_historical_data(&name, args.days).await;
      report(outcome)
    }
    Some(name) => {
      let outcome = client.fetch_country_details(&name).await;
      report(outcome)
    }
    None => {
      let outcome = client.fetch_all_countries(args.refresh).await.map(|mut l| {
        l.sort_by(|a, b| b.cases.cmp(&a.cases));
        l
      });
      report(outcome)
    }
  }
}

/// Print the outcome's data as JSON; cache notes go to stderr so stdout
/// stays machine-readable.
fn report<T: serde::Serialize>(outcome: FetchOutcome<T>) -> Result<()> {
  match outcome {
    FetchOutcome::Fresh(data) => {
      println!("{}", serde_json::to_string_pretty(&data)?);
    }
    FetchOutcome::Cached { data, reason } => {
      eprintln!("note: {}", reason);
      println!("{}", serde_json::to_string_pretty(&data)?);
    }
    FetchOutcome::Unavailable { error } => return Err(eyre!(error)),
  }
  Ok(())
}

/// Log to a file in the data directory; stdout is reserved for output.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("c19s");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(log_dir, "c19s.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
