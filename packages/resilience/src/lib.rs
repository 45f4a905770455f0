#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Keeping a site's ingestion healthy when upstream providers are not.
//!
//! - [`circuit_breaker`] stops hammering a failing (site, source kind) pair
//!   until its backoff window passes.
//! - [`freshness`] reads how recent each of a site's data signals is.
//! - [`outage`] turns those signals into a debounced outage banner.

pub mod circuit_breaker;
pub mod freshness;
pub mod outage;

pub use circuit_breaker::{BreakerCheck, BreakerConfig, BreakerEntry, CircuitBreaker, ErrorClass};
pub use freshness::{Signal, SignalSource, SourceTimestamps};
pub use outage::{MonitoredSite, OutageConfig, OutageDetector, OutageState, OutageStatus};
