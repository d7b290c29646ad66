//! Domain types matching the COVID statistics API responses.
//!
//! Every field is `#[serde(default)]` so records built from sparse input are
//! never partially undefined: numbers come out as zero, strings as empty.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` the same as an absent field.
fn default_on_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identity sub-record for a country.
///
/// The upstream API emits `null` for several of these fields on aggregate
/// rows, so each one is null-tolerant as well as defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryInfo {
  #[serde(rename = "_id", deserialize_with = "default_on_null")]
  pub id: i64,
  #[serde(deserialize_with = "default_on_null")]
  pub iso2: String,
  #[serde(deserialize_with = "default_on_null")]
  pub iso3: String,
  #[serde(deserialize_with = "default_on_null")]
  pub lat: f64,
  #[serde(deserialize_with = "default_on_null")]
  pub long: f64,
  /// URL of the country's flag image
  #[serde(deserialize_with = "default_on_null")]
  pub flag: String,
}

/// Cumulative and per-day statistics for one country.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountryStats {
  /// Last update timestamp, epoch milliseconds
  pub updated: i64,
  pub country: String,
  pub country_info: CountryInfo,
  pub cases: u64,
  pub today_cases: i64,
  pub deaths: u64,
  pub today_deaths: i64,
  pub recovered: u64,
  pub today_recovered: i64,
  pub active: u64,
  pub critical: u64,
  pub cases_per_one_million: f64,
  pub deaths_per_one_million: f64,
  pub tests: u64,
  pub tests_per_one_million: f64,
  pub population: u64,
  pub continent: String,
  pub active_per_million: f64,
  pub recovered_per_million: f64,
  pub critical_per_million: f64,
}

impl CountryStats {
  /// Deaths as a percentage of cases, e.g. `"2.17"`.
  pub fn death_rate(&self) -> String {
    percentage(self.deaths, self.cases)
  }

  /// Recoveries as a percentage of cases.
  pub fn recovery_rate(&self) -> String {
    percentage(self.recovered, self.cases)
  }

  /// Active cases as a percentage of cases.
  pub fn active_rate(&self) -> String {
    percentage(self.active, self.cases)
  }
}

/// `part / total` as a two-decimal percentage string; `"0.00"` when total is 0.
fn percentage(part: u64, total: u64) -> String {
  if total == 0 {
    "0.00".to_string()
  } else {
    format!("{:.2}", part as f64 / total as f64 * 100.0)
  }
}

/// Historical case/death/recovery series for one country.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalData {
  pub country: String,
  pub timeline: Timeline,
}

/// Three parallel date-keyed series.
///
/// Dates are `M/D/YY` strings. The maps preserve the insertion order of the
/// source JSON; no calendar sorting is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeline {
  pub cases: IndexMap<String, u64>,
  pub deaths: IndexMap<String, u64>,
  pub recovered: IndexMap<String, u64>,
}

impl Timeline {
  /// Derive chart points by walking the cases series' keys in insertion
  /// order and looking up the same key in the other two series (missing
  /// entries count as zero).
  pub fn chart_points(&self) -> Vec<ChartPoint> {
    self
      .cases
      .iter()
      .map(|(date, &cases)| ChartPoint {
        date: short_date(date),
        cases,
        deaths: self.deaths.get(date).copied().unwrap_or(0),
        recovered: self.recovered.get(date).copied().unwrap_or(0),
      })
      .collect()
  }

  /// The point for the last key in insertion order. Not necessarily the
  /// chronologically last date.
  pub fn latest(&self) -> Option<ChartPoint> {
    self.chart_points().pop()
  }
}

/// One derived (date, cases, deaths, recovered) point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
  /// Date label with the trailing `/YY` segment dropped, e.g. `"3/1"`
  pub date: String,
  pub cases: u64,
  pub deaths: u64,
  pub recovered: u64,
}

/// `"3/1/21"` -> `"3/1"`. Labels without a `/` pass through unchanged.
fn short_date(date: &str) -> String {
  match date.rsplit_once('/') {
    Some((head, _)) => head.to_string(),
    None => date.to_string(),
  }
}
