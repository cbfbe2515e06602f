pub mod behavior;
pub mod init;
pub mod ranking;
pub mod report;
pub mod set_score;
pub mod stats;
pub mod transcript;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use gradeboard_client::config::{create_store, load_config_from, GradeboardConfig};
use gradeboard_client::InMemoryStore;
use gradeboard_core::traits::RecordStore;
use gradeboard_core::Coordinator;

/// Where records come from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Serve records from a fixture file or directory instead of the API
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// A loaded configuration plus the store it points at.
pub struct Session {
    pub config: GradeboardConfig,
    pub store: Arc<dyn RecordStore>,
}

impl Session {
    pub fn open(source: &SourceArgs) -> Result<Self> {
        let config = load_config_from(source.config.as_deref())?;

        let store: Arc<dyn RecordStore> = match &source.fixture {
            Some(path) => Arc::new(InMemoryStore::from_path(path)?),
            None => create_store(&config.api)?,
        };
        tracing::debug!(store = store.name(), "record store ready");

        Ok(Self { config, store })
    }

    pub fn coordinator(&self) -> Coordinator {
        let mut config = self.config.to_coordinator_config();
        config.eager_realtime_refetch = false;
        Coordinator::new(Arc::clone(&self.store), config)
    }
}

pub fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
