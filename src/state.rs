//! Application state: document store, reward ledger, tutor client and config.
//!
//! This module owns:
//!   - the document store (in-memory, optionally snapshotted to JSON)
//!   - the ledger that serializes quest attempts per user
//!   - the optional tutor / generation client
//!   - prompts, limits and user-facing messages from TOML (or defaults)

use std::{sync::Arc, time::Duration};

use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::engine::{EngineConfig, ProgressionEngine};
use crate::error::StoreError;
use crate::ledger::Ledger;
use crate::seeds::seed_if_empty;
use crate::store::DocumentStore;
use crate::tutor::Tutor;

pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub ledger: Ledger<DocumentStore>,
    pub tutor: Option<Tutor>,
    pub config: AppConfig,
    pub store_timeout: Duration,
}

impl AppState {
    /// Build state from config: open (and seed) the store, init the tutor client.
    #[instrument(level = "info", skip_all)]
    pub async fn new(config: AppConfig) -> Result<Self, StoreError> {
        let store = match &config.store.snapshot_path {
            Some(path) => DocumentStore::open(path.clone()).await?,
            None => {
                info!(target: "store", "No snapshot path configured; data lives in memory only");
                DocumentStore::in_memory()
            }
        };
        seed_if_empty(&store).await?;

        let tutor = Tutor::from_env();
        if let Some(t) = &tutor {
            info!(target: "questline", base_url = %t.base_url, fast_model = %t.fast_model, strong_model = %t.strong_model, "Tutor enabled.");
        } else {
            info!(target: "questline", "Tutor disabled (no OPENAI_API_KEY). Fallback messages will be used.");
        }

        Ok(Self::with_parts(store, config, tutor))
    }

    /// Assemble state from already constructed parts.
    pub fn with_parts(store: DocumentStore, config: AppConfig, tutor: Option<Tutor>) -> Self {
        let store = Arc::new(store);
        let store_timeout = config.store.timeout();
        let engine = ProgressionEngine::new(EngineConfig::from(&config.engine));
        info!(target: "questline", track_streaks = config.engine.track_streaks, timeout = ?store_timeout, "Progression engine configured");
        Self {
            ledger: Ledger::new(store.clone(), engine, store_timeout),
            store,
            tutor,
            config,
            store_timeout,
        }
    }
}
