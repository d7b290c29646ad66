use crate::config::Config;
use crate::covid::types::{CountryStats, HistoricalData};
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// How far back to request historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoricalDays {
  /// The full series the API holds
  #[default]
  All,
  /// Only the last N days
  Last(u32),
}

impl fmt::Display for HistoricalDays {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HistoricalDays::All => write!(f, "all"),
      HistoricalDays::Last(n) => write!(f, "{}", n),
    }
  }
}

impl FromStr for HistoricalDays {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.eq_ignore_ascii_case("all") {
      return Ok(HistoricalDays::All);
    }
    s.parse::<u32>()
      .map(HistoricalDays::Last)
      .map_err(|_| format!("expected 'all' or a number of days, got '{}'", s))
  }
}

/// Remote data source for COVID statistics.
///
/// The engine only depends on this trait, so tests can substitute a scripted
/// provider for the HTTP client.
#[async_trait]
pub trait CovidProvider: Send + Sync {
  /// Fetch statistics for every country.
  async fn all_countries(&self) -> Result<Vec<CountryStats>>;

  /// Fetch statistics for one country by name.
  async fn country(&self, name: &str) -> Result<CountryStats>;

  /// Fetch the historical series for one country.
  async fn historical(&self, name: &str, days: HistoricalDays) -> Result<HistoricalData>;
}

/// COVID statistics API client (disease.sh-compatible REST endpoints).
#[derive(Clone)]
pub struct CovidApiClient {
  client: reqwest::Client,
  base_url: Url,
}

impl CovidApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  /// Build an endpoint URL under the base, percent-encoding each segment.
  fn endpoint(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("API base URL cannot be a base"))?
      .extend(segments);
    Ok(url)
  }

  async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?
      .error_for_status()
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }
}

#[async_trait]
impl CovidProvider for CovidApiClient {
  async fn all_countries(&self) -> Result<Vec<CountryStats>> {
    let url = self.endpoint(&["countries"])?;
    self.get_json(url).await
  }

  async fn country(&self, name: &str) -> Result<CountryStats> {
    let url = self.endpoint(&["countries", name])?;
    self.get_json(url).await
  }

  async fn historical(&self, name: &str, days: HistoricalDays) -> Result<HistoricalData> {
    let mut url = self.endpoint(&["historical", name])?;
    url
      .query_pairs_mut()
      .append_pair("lastdays", &days.to_string());
    self.get_json(url).await
  }
}
