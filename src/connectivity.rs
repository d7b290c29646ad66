//! Network reachability probing.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Reports whether the network is currently reachable.
///
/// `current_status` returns the latest known value without blocking; the
/// engine reads it once per operation, so a connectivity flip mid-flight
/// does not affect a fetch already in progress. `subscribe` delivers
/// push-style change notifications.
pub trait ConnectivityProbe: Send + Sync {
  fn current_status(&self) -> bool;

  fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Probe with a fixed answer. Used in tests and for forced-offline mode.
pub struct StaticProbe {
  online: bool,
  tx: watch::Sender<bool>,
}

impl StaticProbe {
  pub fn new(online: bool) -> Self {
    let (tx, _) = watch::channel(online);
    Self { online, tx }
  }
}

impl ConnectivityProbe for StaticProbe {
  fn current_status(&self) -> bool {
    self.online
  }

  fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Probe that checks reachability with a lightweight HTTP request and
/// remembers the last answer.
pub struct HttpConnectivityProbe {
  client: reqwest::Client,
  probe_url: String,
  online: AtomicBool,
  tx: watch::Sender<bool>,
}

impl HttpConnectivityProbe {
  /// Create a probe against the given URL (typically the API origin).
  /// Starts out assuming we are online until a check says otherwise.
  pub fn new(probe_url: impl Into<String>) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(5))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    let (tx, _) = watch::channel(true);

    Ok(Self {
      client,
      probe_url: probe_url.into(),
      online: AtomicBool::new(true),
      tx,
    })
  }

  /// Run one reachability check and record the result.
  pub async fn check_now(&self) -> bool {
    let online = match self.client.head(&self.probe_url).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!("connectivity check failed: {}", e);
        false
      }
    };

    if self.online.swap(online, Ordering::SeqCst) != online {
      // Notify only on actual transitions
      let _ = self.tx.send(online);
    }
    online
  }

  /// Spawn a background task that re-checks on an interval.
  pub fn spawn_monitor(self: &Arc<Self>, interval: Duration) {
    let probe = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        probe.check_now().await;
      }
    });
  }
}

impl ConnectivityProbe for HttpConnectivityProbe {
  fn current_status(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn static_probe_reports_fixed_value() {
    assert!(StaticProbe::new(true).current_status());
    assert!(!StaticProbe::new(false).current_status());
  }

  #[tokio::test]
  async fn unreachable_url_flips_status_and_notifies() {
    let probe = HttpConnectivityProbe::new("http://127.0.0.1:1/").unwrap();
    let mut rx = probe.subscribe();
    assert!(probe.current_status());

    assert!(!probe.check_now().await);
    assert!(!probe.current_status());

    rx.changed().await.unwrap();
    assert!(!*rx.borrow());
  }

  #[tokio::test]
  async fn repeated_failures_notify_once() {
    let probe = HttpConnectivityProbe::new("http://127.0.0.1:1/").unwrap();
    let mut rx = probe.subscribe();

    probe.check_now().await;
    probe.check_now().await;

    rx.changed().await.unwrap();
    // No second transition queued
    assert!(!rx.has_changed().unwrap());
  }
}
