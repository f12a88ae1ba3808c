//! Process runtime: the explicit context object built once at startup.
//!
//! Replaces ambient globals with a single [`Runtime`] constructed in
//! `main` and passed (or `Arc`-shared) into every component. Startup runs
//! the pipeline in order: certificate materialization, connection chain,
//! schema bootstrap, encoder load. Store unreachability is survivable —
//! the runtime comes up degraded and `ready()` reports `false` — but an
//! encoder that cannot load is a configuration error and fails
//! initialization outright.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::bootstrap::{self, BootstrapReport};
use crate::certificate;
use crate::config::Config;
use crate::connect::{self, ConnectionAttemptRecord};
use crate::embedding::{self, Embedder};
use crate::metrics::RetrievalMetrics;
use crate::retrieval::Retriever;
use crate::store::StoreHandle;

/// Shared subsystem state, initialized exactly once per process and
/// read-mostly afterwards.
pub struct Runtime {
    pub config: Config,
    pub store: Arc<StoreHandle>,
    pub embedder: Arc<dyn Embedder>,
    pub metrics: Arc<RetrievalMetrics>,
    pub retriever: Retriever,
    pub attempts: Vec<ConnectionAttemptRecord>,
    pub bootstrap: BootstrapReport,
}

impl Runtime {
    /// Build the runtime. Never fails on store unreachability (degraded
    /// mode instead); fails on config-level problems such as an encoder
    /// that cannot load.
    pub async fn initialize(config: Config) -> Result<Runtime> {
        // Encoder first: it is the expensive, fail-fast step, and its
        // dimensionality feeds the similarity index. The blocking load
        // (possible one-time artifact download) stays off the async
        // runtime threads.
        let encoder_config = config.encoder.clone();
        let embedder = tokio::task::spawn_blocking(move || {
            embedding::create_embedder(&encoder_config)
        })
        .await
        .context("encoder load task panicked")?
        .context("failed to load sentence encoder")?;
        let embedder: Arc<dyn Embedder> = Arc::from(embedder);

        let cert = match certificate::materialize(&config.certificate) {
            Ok(cert) => cert,
            Err(e) => {
                warn!("certificate materialization failed: {e}; certificate strategies skipped");
                None
            }
        };

        let (store, attempts) = connect::establish(&config, cert.as_ref()).await;
        let store = Arc::new(store);

        let bootstrap = bootstrap::run(&store, embedder.dims()).await;

        let metrics = Arc::new(RetrievalMetrics::new());
        let retriever = Retriever::new(
            store.clone(),
            embedder.clone(),
            metrics.clone(),
            config.retrieval.default_limit,
        );

        Ok(Runtime {
            config,
            store,
            embedder,
            metrics,
            retriever,
            attempts,
            bootstrap,
        })
    }

    /// True when the store is connected and the schema bootstrap
    /// succeeded. `false` means degraded, not crashed: searches return
    /// empty results and ingestion reports unavailable.
    pub fn ready(&self) -> bool {
        !self.store.is_degraded() && self.bootstrap.ok
    }
}
