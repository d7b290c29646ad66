//! COVID-19 statistics client core: a remote statistics provider, a local
//! key-value cache, and the freshness policy that reconciles the two.
//!
//! The UI layer consumes [`covid::CachedCovidClient`] and its
//! [`cache::FetchOutcome`] results; everything else here is plumbing for it.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod covid;
