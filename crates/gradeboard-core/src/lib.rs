//! gradeboard-core: score aggregation engines and the derived-data cache.
//!
//! This crate defines the record model, the pure aggregation engines
//! (weighted averages, class statistics, rankings, behavior summaries) and
//! the coordinator that caches their outputs and keeps them consistent as
//! records are mutated.

pub mod average;
pub mod behavior;
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod fixture;
pub mod model;
pub mod ranking;
pub mod report;
pub mod scope;
pub mod statistics;
pub mod traits;
pub mod view;

pub use coordinator::{Coordinator, CoordinatorConfig, ReadOptions, ReadPolicy};
pub use error::{EngineError, StoreError, ValidationError};
pub use scope::{CacheKey, Fingerprint, ScopeKey, Variant};
pub use traits::{Clock, RecordStore};
