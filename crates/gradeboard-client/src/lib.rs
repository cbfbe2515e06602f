//! gradeboard-client: record store implementations.
//!
//! Implements the `RecordStore` trait against the school portal's REST API
//! and against in-memory fixtures, and loads the gradeboard configuration.

pub mod config;
pub mod credential;
pub mod http;
pub mod memory;

pub use config::{create_store, load_config, load_config_from, GradeboardConfig};
pub use credential::Credential;
pub use http::HttpRecordStore;
pub use memory::{Endpoint, InMemoryStore};
