//! Cached COVID client: freshness-gated fetching with cache fallback.
//!
//! Wraps a [`CovidProvider`] and provides the same three reads, but decides
//! per call whether to serve the local cache, hit the network, or fall back
//! to cache when the network path fails. Successful remote results are
//! persisted. No error escapes a public operation; every path terminates
//! in a [`FetchOutcome`].

use chrono::Utc;
use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{CacheReason, FetchOutcome, KeyValueStore};
use crate::connectivity::ConnectivityProbe;

use super::cache::CovidCache;
use super::client::{CovidProvider, HistoricalDays};
use super::types::{CountryStats, HistoricalData};

/// How long a cached country list stays trusted without a remote call.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// COVID client with transparent caching and offline support.
pub struct CachedCovidClient<P: CovidProvider> {
  provider: P,
  cache: CovidCache,
  probe: Arc<dyn ConnectivityProbe>,
  max_age: Duration,
}

impl<P: CovidProvider> CachedCovidClient<P> {
  pub fn new(
    provider: P,
    store: Arc<dyn KeyValueStore>,
    probe: Arc<dyn ConnectivityProbe>,
  ) -> Self {
    Self {
      provider,
      cache: CovidCache::new(store),
      probe,
      max_age: DEFAULT_MAX_AGE,
    }
  }

  /// Override the max age of the country-list cache.
  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = max_age;
    self
  }

  fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
  }

  /// Stale when no marker exists, or the marker is strictly older than the
  /// max age. An age exactly equal to the max age is still fresh.
  fn is_stale(&self, marker: Option<i64>, now_ms: i64) -> bool {
    match marker {
      Some(m) => now_ms - m > self.max_age.as_millis() as i64,
      None => true,
    }
  }

  /// Fetch the full country list.
  ///
  /// Policy: serve cache while the freshness marker is within the max age;
  /// otherwise (or on `force_refresh`) fetch remote when online, persisting
  /// the result and advancing the marker; fall back to cache on any remote
  /// failure. A storage fault downgrades to one last cache read.
  pub async fn fetch_all_countries(&self, force_refresh: bool) -> FetchOutcome<Vec<CountryStats>> {
    match self.fetch_all_inner(force_refresh).await {
      Ok(outcome) => outcome,
      Err(err) => {
        warn!("country list fetch fault: {:#}", err);
        match self.cache.countries() {
          Ok(Some(list)) => FetchOutcome::Cached {
            data: list,
            reason: CacheReason::AfterError,
          },
          _ => FetchOutcome::unavailable(err.to_string()),
        }
      }
    }
  }

  async fn fetch_all_inner(&self, force_refresh: bool) -> Result<FetchOutcome<Vec<CountryStats>>> {
    let online = self.probe.current_status();
    let marker = self.cache.last_updated()?;
    let now = Self::now_ms();
    let stale = self.is_stale(marker, now);

    if !force_refresh && !stale {
      if let Some(list) = self.cache.countries()? {
        debug!("serving country list from cache");
        return Ok(FetchOutcome::Cached {
          data: list,
          reason: CacheReason::WithinMaxAge,
        });
      }
    }

    if online && (force_refresh || stale) {
      match self.provider.all_countries().await {
        Ok(list) => {
          self.cache.store_countries(&list)?;
          self.cache.set_last_updated(Self::now_ms())?;
          return Ok(FetchOutcome::Fresh(list));
        }
        Err(err) => warn!("country list fetch failed: {:#}", err),
      }
    }

    match self.cache.countries()? {
      Some(list) => Ok(FetchOutcome::Cached {
        data: list,
        reason: CacheReason::Offline,
      }),
      None => Ok(FetchOutcome::unavailable("No data available")),
    }
  }

  /// Fetch one country's statistics.
  ///
  /// Remote when online; otherwise, or on remote failure, an exact-name
  /// lookup in the cached full list. The name comparison is byte-for-byte;
  /// no normalization is performed.
  pub async fn fetch_country_details(&self, name: &str) -> FetchOutcome<CountryStats> {
    match self.details_inner(name).await {
      Ok(outcome) => outcome,
      // No cache fallback after a fault for this operation
      Err(err) => {
        warn!("country details fault for {}: {:#}", name, err);
        FetchOutcome::unavailable(err.to_string())
      }
    }
  }

  async fn details_inner(&self, name: &str) -> Result<FetchOutcome<CountryStats>> {
    if self.probe.current_status() {
      match self.provider.country(name).await {
        Ok(stats) => return Ok(FetchOutcome::Fresh(stats)),
        Err(err) => warn!("country fetch failed for {}: {:#}", name, err),
      }
    }

    if let Some(list) = self.cache.countries()? {
      if let Some(stats) = list.into_iter().find(|c| c.country == name) {
        return Ok(FetchOutcome::Cached {
          data: stats,
          reason: CacheReason::Offline,
        });
      }
    }

    Ok(FetchOutcome::unavailable("Country data not available"))
  }

  /// Fetch one country's historical series.
  ///
  /// The cache slot is read up front and reused as the fallback. There is
  /// no staleness gate here: when online the series is always refetched and
  /// its slot overwritten.
  pub async fn fetch_historical_data(
    &self,
    name: &str,
    days: HistoricalDays,
  ) -> FetchOutcome<HistoricalData> {
    match self.historical_inner(name, days).await {
      Ok(outcome) => outcome,
      Err(err) => {
        warn!("historical fetch fault for {}: {:#}", name, err);
        match self.cache.historical(name) {
          Ok(Some(data)) => FetchOutcome::Cached {
            data,
            reason: CacheReason::AfterError,
          },
          _ => FetchOutcome::unavailable(err.to_string()),
        }
      }
    }
  }

  async fn historical_inner(
    &self,
    name: &str,
    days: HistoricalDays,
  ) -> Result<FetchOutcome<HistoricalData>> {
    let cached = self.cache.historical(name)?;

    if self.probe.current_status() {
      match self.provider.historical(name, days).await {
        Ok(data) => {
          self.cache.store_historical(name, &data)?;
          return Ok(FetchOutcome::Fresh(data));
        }
        Err(err) => warn!("historical fetch failed for {}: {:#}", name, err),
      }
    }

    match cached {
      Some(data) => Ok(FetchOutcome::Cached {
        data,
        reason: CacheReason::Offline,
      }),
      None => Ok(FetchOutcome::unavailable("Historical data not available")),
    }
  }

  /// Force a remote refresh of the country list regardless of freshness,
  /// with the same fallback chain as [`fetch_all_countries`].
  ///
  /// [`fetch_all_countries`]: Self::fetch_all_countries
  pub async fn refresh(&self) -> FetchOutcome<Vec<CountryStats>> {
    self.fetch_all_countries(true).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::connectivity::StaticProbe;
  use crate::covid::types::Timeline;
  use async_trait::async_trait;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Provider double with scripted responses and call counters.
  #[derive(Clone, Default)]
  struct MockProvider {
    // None means the call fails
    countries: Option<Vec<CountryStats>>,
    single: Option<CountryStats>,
    historical: Option<HistoricalData>,
    list_calls: Arc<AtomicUsize>,
    country_calls: Arc<AtomicUsize>,
    historical_calls: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl CovidProvider for MockProvider {
    async fn all_countries(&self) -> Result<Vec<CountryStats>> {
      self.list_calls.fetch_add(1, Ordering::SeqCst);
      self
        .countries
        .clone()
        .ok_or_else(|| eyre!("API unavailable"))
    }

    async fn country(&self, _name: &str) -> Result<CountryStats> {
      self.country_calls.fetch_add(1, Ordering::SeqCst);
      self.single.clone().ok_or_else(|| eyre!("API unavailable"))
    }

    async fn historical(&self, _name: &str, _days: HistoricalDays) -> Result<HistoricalData> {
      self.historical_calls.fetch_add(1, Ordering::SeqCst);
      self
        .historical
        .clone()
        .ok_or_else(|| eyre!("API unavailable"))
    }
  }

  /// Store whose writes fail while reads keep working.
  struct ReadOnlyStore {
    inner: MemoryStore,
  }

  impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
      self.inner.get(key)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("disk full"))
    }

    fn remove(&self, key: &str) -> Result<()> {
      self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
      self.inner.clear()
    }
  }

  fn stats(name: &str, cases: u64) -> CountryStats {
    CountryStats {
      country: name.to_string(),
      cases,
      ..Default::default()
    }
  }

  fn sample_list() -> Vec<CountryStats> {
    vec![stats("France", 100), stats("Peru", 50)]
  }

  fn sample_historical(name: &str) -> HistoricalData {
    let timeline: Timeline =
      serde_json::from_str(r#"{"cases":{"3/1/21":10},"deaths":{"3/1/21":1},"recovered":{}}"#)
        .unwrap();
    HistoricalData {
      country: name.to_string(),
      timeline,
    }
  }

  fn client(
    provider: MockProvider,
    store: Arc<dyn KeyValueStore>,
    online: bool,
  ) -> CachedCovidClient<MockProvider> {
    CachedCovidClient::new(provider, store, Arc::new(StaticProbe::new(online)))
  }

  fn seed_countries(store: &Arc<MemoryStore>, fresh_marker: bool) {
    let cache = CovidCache::new(Arc::clone(store) as Arc<dyn KeyValueStore>);
    cache.store_countries(&sample_list()).unwrap();
    if fresh_marker {
      cache
        .set_last_updated(Utc::now().timestamp_millis())
        .unwrap();
    }
  }

  #[test]
  fn staleness_boundary() {
    let svc = client(MockProvider::default(), Arc::new(MemoryStore::new()), true)
      .with_max_age(Duration::from_millis(1000));

    // Absent marker is always stale
    assert!(svc.is_stale(None, 5000));
    // Age exactly equal to max age is NOT stale
    assert!(!svc.is_stale(Some(4000), 5000));
    // One past the boundary is
    assert!(svc.is_stale(Some(3999), 5000));
    // Younger than max age is fresh
    assert!(!svc.is_stale(Some(4500), 5000));
  }

  #[tokio::test]
  async fn fresh_cache_skips_remote() {
    let store = Arc::new(MemoryStore::new());
    seed_countries(&store, true);

    let provider = MockProvider {
      countries: Some(vec![stats("Remote", 999)]),
      ..Default::default()
    };
    let calls = Arc::clone(&provider.list_calls);
    let svc = client(provider, store, true);

    let outcome = svc.fetch_all_countries(false).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(outcome.from_cache());
    assert_eq!(outcome.reason(), Some(CacheReason::WithinMaxAge));
    assert_eq!(outcome.data().unwrap(), &sample_list());
  }

  #[tokio::test]
  async fn force_refresh_hits_remote_despite_fresh_marker() {
    let store = Arc::new(MemoryStore::new());
    seed_countries(&store, true);

    let provider = MockProvider {
      countries: Some(vec![stats("Remote", 999)]),
      ..Default::default()
    };
    let calls = Arc::clone(&provider.list_calls);
    let svc = client(provider, Arc::clone(&store) as Arc<dyn KeyValueStore>, true);

    let outcome = svc.fetch_all_countries(true).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome, FetchOutcome::Fresh(_)));

    // The remote result replaced the cached list
    let cache = CovidCache::new(store as Arc<dyn KeyValueStore>);
    assert_eq!(cache.countries().unwrap().unwrap()[0].country, "Remote");
  }

  #[tokio::test]
  async fn stale_marker_triggers_remote_and_advances_marker() {
    let store = Arc::new(MemoryStore::new());
    let cache = CovidCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
    cache.store_countries(&sample_list()).unwrap();
    let old_marker = Utc::now().timestamp_millis() - 10_000;
    cache.set_last_updated(old_marker).unwrap();

    let provider = MockProvider {
      countries: Some(vec![stats("Remote", 999)]),
      ..Default::default()
    };
    let svc = client(provider, Arc::clone(&store) as Arc<dyn KeyValueStore>, true)
      .with_max_age(Duration::from_secs(1));

    let outcome = svc.fetch_all_countries(false).await;

    assert!(matches!(outcome, FetchOutcome::Fresh(_)));
    assert!(cache.last_updated().unwrap().unwrap() > old_marker);
  }

  #[tokio::test]
  async fn offline_with_cache_serves_cache_for_all_operations() {
    let store = Arc::new(MemoryStore::new());
    seed_countries(&store, true);
    let cache = CovidCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
    cache
      .store_historical("France", &sample_historical("France"))
      .unwrap();

    let svc = client(MockProvider::default(), store, false);

    let list = svc.fetch_all_countries(false).await;
    assert!(list.is_success());
    assert!(list.from_cache());

    let details = svc.fetch_country_details("France").await;
    assert!(details.is_success());
    assert!(details.from_cache());
    assert_eq!(details.reason(), Some(CacheReason::Offline));

    let historical = svc
      .fetch_historical_data("France", HistoricalDays::All)
      .await;
    assert!(historical.is_success());
    assert!(historical.from_cache());
  }

  #[tokio::test]
  async fn offline_with_empty_cache_fails_all_operations() {
    let svc = client(MockProvider::default(), Arc::new(MemoryStore::new()), false);

    let list = svc.fetch_all_countries(false).await;
    assert_eq!(list.error(), Some("No data available"));

    let details = svc.fetch_country_details("France").await;
    assert_eq!(details.error(), Some("Country data not available"));

    let historical = svc
      .fetch_historical_data("France", HistoricalDays::All)
      .await;
    assert_eq!(historical.error(), Some("Historical data not available"));
  }

  #[tokio::test]
  async fn remote_failure_online_falls_back_to_cache() {
    let store = Arc::new(MemoryStore::new());
    let cache = CovidCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
    cache.store_countries(&sample_list()).unwrap();
    // Stale marker so the remote path is attempted
    cache.set_last_updated(0).unwrap();

    // Provider fails every call
    let svc = client(
      MockProvider::default(),
      Arc::clone(&store) as Arc<dyn KeyValueStore>,
      true,
    );

    let outcome = svc.fetch_all_countries(false).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.reason(), Some(CacheReason::Offline));
  }

  #[tokio::test]
  async fn details_search_is_case_sensitive() {
    let store = Arc::new(MemoryStore::new());
    seed_countries(&store, true);

    let svc = client(MockProvider::default(), store, false);

    let exact = svc.fetch_country_details("France").await;
    assert!(exact.is_success());

    let wrong_case = svc.fetch_country_details("france").await;
    assert_eq!(wrong_case.error(), Some("Country data not available"));
  }

  #[tokio::test]
  async fn historical_always_refetches_online() {
    let store = Arc::new(MemoryStore::new());
    let cache = CovidCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
    cache
      .store_historical("Peru", &sample_historical("Old"))
      .unwrap();

    let provider = MockProvider {
      historical: Some(sample_historical("Peru")),
      ..Default::default()
    };
    let calls = Arc::clone(&provider.historical_calls);
    let svc = client(provider, Arc::clone(&store) as Arc<dyn KeyValueStore>, true);

    let outcome = svc.fetch_historical_data("Peru", HistoricalDays::All).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome, FetchOutcome::Fresh(_)));
    // Slot overwritten with the fresh series
    assert_eq!(cache.historical("Peru").unwrap().unwrap().country, "Peru");
  }

  #[tokio::test]
  async fn historical_remote_failure_reuses_upfront_read() {
    let store = Arc::new(MemoryStore::new());
    let cache = CovidCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
    cache
      .store_historical("Peru", &sample_historical("Peru"))
      .unwrap();

    // Online but the provider fails
    let svc = client(
      MockProvider::default(),
      Arc::clone(&store) as Arc<dyn KeyValueStore>,
      true,
    );

    let outcome = svc.fetch_historical_data("Peru", HistoricalDays::All).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.reason(), Some(CacheReason::Offline));
  }

  #[tokio::test]
  async fn store_write_fault_downgrades_to_cached_data() {
    // Seed the backing map before wrapping it read-only
    let inner = MemoryStore::new();
    let raw = serde_json::to_string(&sample_list()).unwrap();
    inner.set("countries", &raw).unwrap();

    let store: Arc<dyn KeyValueStore> = Arc::new(ReadOnlyStore { inner });
    let provider = MockProvider {
      countries: Some(vec![stats("Remote", 999)]),
      ..Default::default()
    };
    let svc = client(provider, store, true);

    // Remote succeeds but persisting faults; the cached copy is served
    let outcome = svc.fetch_all_countries(true).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.reason(), Some(CacheReason::AfterError));
    assert_eq!(outcome.data().unwrap(), &sample_list());
  }

  #[tokio::test]
  async fn store_write_fault_with_empty_cache_reports_fault() {
    let store: Arc<dyn KeyValueStore> = Arc::new(ReadOnlyStore {
      inner: MemoryStore::new(),
    });
    let provider = MockProvider {
      countries: Some(vec![stats("Remote", 999)]),
      ..Default::default()
    };
    let svc = client(provider, store, true);

    let outcome = svc.fetch_all_countries(true).await;
    assert_eq!(outcome.error(), Some("disk full"));
  }

  #[tokio::test]
  async fn details_fault_has_no_cache_fallback() {
    let store = Arc::new(MemoryStore::new());
    // A corrupt list makes the cache search fault
    store.set("countries", "{not json").unwrap();

    let svc = client(
      MockProvider::default(),
      store as Arc<dyn KeyValueStore>,
      false,
    );

    let outcome = svc.fetch_country_details("France").await;
    assert!(!outcome.is_success());
    assert!(outcome.error().unwrap().contains("Corrupt cache entry"));
  }

  #[tokio::test]
  async fn concurrent_refreshes_never_corrupt_storage() {
    let store = Arc::new(MemoryStore::new());
    let provider = MockProvider {
      countries: Some(sample_list()),
      ..Default::default()
    };
    let svc = Arc::new(client(
      provider,
      Arc::clone(&store) as Arc<dyn KeyValueStore>,
      true,
    ));

    let a = tokio::spawn({
      let svc = Arc::clone(&svc);
      async move { svc.refresh().await }
    });
    let b = tokio::spawn({
      let svc = Arc::clone(&svc);
      async move { svc.refresh().await }
    });

    assert!(a.await.unwrap().is_success());
    assert!(b.await.unwrap().is_success());

    // Whatever interleaving happened, both slots hold parseable values
    let list: Vec<CountryStats> =
      serde_json::from_str(&store.get("countries").unwrap().unwrap()).unwrap();
    assert_eq!(list, sample_list());
    let marker: i64 =
      serde_json::from_str(&store.get("countries_updated_at").unwrap().unwrap()).unwrap();
    assert!(marker > 0);
  }
}
