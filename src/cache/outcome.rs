//! Outcome types for cache-aware fetch operations.

use std::fmt;

/// Why a fetch operation answered from the cache instead of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheReason {
  /// Cache is younger than the configured max age; no remote call was made
  WithinMaxAge,
  /// Offline, or the remote call failed; serving the cached copy
  Offline,
  /// A storage or provider fault was recovered by falling back to cache
  AfterError,
}

impl fmt::Display for CacheReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheReason::WithinMaxAge => write!(f, "cache is fresh"),
      CacheReason::Offline => write!(f, "offline or API unavailable"),
      CacheReason::AfterError => write!(f, "using cached data due to error"),
    }
  }
}

/// Result of a fetch operation, tagged with where the data came from.
///
/// Every engine operation terminates in one of these variants; remote and
/// storage failures never escape as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
  /// Fresh data from the network, persisted to cache
  Fresh(T),
  /// Data served from the local cache
  Cached { data: T, reason: CacheReason },
  /// Neither network nor cache could produce data
  Unavailable { error: String },
}

impl<T> FetchOutcome<T> {
  /// Shorthand for an `Unavailable` outcome.
  pub fn unavailable(error: impl Into<String>) -> Self {
    FetchOutcome::Unavailable {
      error: error.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    !matches!(self, FetchOutcome::Unavailable { .. })
  }

  pub fn from_cache(&self) -> bool {
    matches!(self, FetchOutcome::Cached { .. })
  }

  /// The cache reason, if the data was served from cache.
  pub fn reason(&self) -> Option<CacheReason> {
    match self {
      FetchOutcome::Cached { reason, .. } => Some(*reason),
      _ => None,
    }
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      FetchOutcome::Fresh(data) | FetchOutcome::Cached { data, .. } => Some(data),
      FetchOutcome::Unavailable { .. } => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      FetchOutcome::Unavailable { error } => Some(error),
      _ => None,
    }
  }

  /// Transform the data while keeping the outcome tag.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
    match self {
      FetchOutcome::Fresh(data) => FetchOutcome::Fresh(f(data)),
      FetchOutcome::Cached { data, reason } => FetchOutcome::Cached {
        data: f(data),
        reason,
      },
      FetchOutcome::Unavailable { error } => FetchOutcome::Unavailable { error },
    }
  }

  /// Consume the outcome, yielding the data if any was produced.
  pub fn into_data(self) -> Option<T> {
    match self {
      FetchOutcome::Fresh(data) | FetchOutcome::Cached { data, .. } => Some(data),
      FetchOutcome::Unavailable { .. } => None,
    }
  }
}
