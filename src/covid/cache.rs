//! Cache slot layout for COVID data.
//!
//! Maps the logical slots (country list, freshness marker, one historical
//! series per country) onto string keys in a [`KeyValueStore`], and performs
//! the JSON encode/decode on the way through.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use crate::cache::KeyValueStore;
use crate::covid::types::{CountryStats, HistoricalData};

/// Slot holding the full country list.
const COUNTRIES_KEY: &str = "countries";
/// Slot holding the epoch-ms timestamp of the last successful list fetch.
const LAST_UPDATED_KEY: &str = "countries_updated_at";
/// Prefix for per-country historical slots.
const HISTORICAL_PREFIX: &str = "historical:";

/// COVID-specific view over a generic key-value store.
#[derive(Clone)]
pub struct CovidCache {
  store: Arc<dyn KeyValueStore>,
}

impl CovidCache {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// Read the cached country list, if any.
  pub fn countries(&self) -> Result<Option<Vec<CountryStats>>> {
    self.read_slot(COUNTRIES_KEY)
  }

  /// Persist the full country list verbatim.
  pub fn store_countries(&self, countries: &[CountryStats]) -> Result<()> {
    self.write_slot(COUNTRIES_KEY, &countries)
  }

  /// Read the freshness marker (epoch milliseconds).
  pub fn last_updated(&self) -> Result<Option<i64>> {
    self.read_slot(LAST_UPDATED_KEY)
  }

  /// Set the freshness marker.
  pub fn set_last_updated(&self, epoch_ms: i64) -> Result<()> {
    self.write_slot(LAST_UPDATED_KEY, &epoch_ms)
  }

  /// Read the cached historical series for one country.
  pub fn historical(&self, country: &str) -> Result<Option<HistoricalData>> {
    self.read_slot(&historical_key(country))
  }

  /// Persist the historical series for one country, overwriting its slot.
  pub fn store_historical(&self, country: &str, data: &HistoricalData) -> Result<()> {
    self.write_slot(&historical_key(country), data)
  }

  fn read_slot<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self.store.get(key)? {
      Some(raw) => {
        let value = serde_json::from_str(&raw)
          .map_err(|e| eyre!("Corrupt cache entry at {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  fn write_slot<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let raw =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
    self.store.set(key, &raw)
  }
}

/// Historical slots embed the country name exactly as the API spells it,
/// byte-for-byte. No case or whitespace normalization.
fn historical_key(country: &str) -> String {
  format!("{}{}", HISTORICAL_PREFIX, country)
}
