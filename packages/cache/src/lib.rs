#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The per-site weather cache.
//!
//! Consumers read only this record. It holds the latest merged
//! observation, per-source provenance timestamps, and the day's running
//! extremes. [`merge`] decides field by field whether a missing value may
//! fall back to the cached one; [`CacheWriter`] applies a fresh observation
//! to the persisted record under the state store's lock.

pub mod merge;
pub mod record;
pub mod writer;

pub use merge::merge;
pub use record::{CacheRecord, DailyExtremes};
pub use writer::CacheWriter;
