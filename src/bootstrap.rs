//! Idempotent schema bootstrap.
//!
//! Ensures the database, the fixed collection set, their secondary indexes,
//! and the similarity index over the embedding field. Re-running against an
//! already provisioned store is a no-op: create-if-missing everywhere, with
//! `412`/`"exists"` answers counted as success.
//!
//! A service tier without similarity-index support answers `501`; that is a
//! capability limitation, not an error — the bootstrapper logs it at
//! `warn!` and falls back to a basic index on the embedding field, which
//! still permits approximate nearest-neighbor scans. `run()` itself never
//! returns an error and never panics past its boundary; step failures are
//! logged and recorded in the report.

use tracing::{debug, error, info, warn};

use crate::store::{Direction, IndexOutcome, IndexSpec, StoreHandle};

/// Collection holding the embedded reference corpus.
pub const VECTOR_COLLECTION: &str = "vector_embeddings";
/// Collection holding chat transcripts.
pub const CHATS_COLLECTION: &str = "chats";
/// Name of the similarity index over the embedding field.
pub const VECTOR_INDEX_NAME: &str = "vector_search";

/// All collections the subsystem relies on, for existence checks and the
/// status command.
pub const COLLECTIONS: [&str; 4] = [CHATS_COLLECTION, VECTOR_COLLECTION, "users", "feedback"];

/// Outcome of the similarity-index step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorIndexState {
    /// Cosine similarity index is in place.
    Ready,
    /// Tier does not support similarity indexes; basic index substituted.
    FallbackBasic,
    /// Nothing attempted (degraded store) or both attempts failed.
    Skipped,
}

impl VectorIndexState {
    pub fn as_str(self) -> &'static str {
        match self {
            VectorIndexState::Ready => "ready",
            VectorIndexState::FallbackBasic => "fallback-basic",
            VectorIndexState::Skipped => "skipped",
        }
    }
}

/// What the bootstrap run accomplished.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    /// True when every step succeeded (tier fallback counts as success).
    pub ok: bool,
    pub collections_ensured: usize,
    pub indexes_ensured: usize,
    pub vector_index: VectorIndexState,
}

impl BootstrapReport {
    fn skipped() -> Self {
        Self {
            ok: false,
            collections_ensured: 0,
            indexes_ensured: 0,
            vector_index: VectorIndexState::Skipped,
        }
    }
}

/// Secondary indexes per collection.
fn collection_indexes(collection: &str) -> Vec<IndexSpec> {
    match collection {
        CHATS_COLLECTION => vec![IndexSpec::Basic {
            name: "user_id_timestamp".to_string(),
            fields: vec![
                ("user_id".to_string(), Direction::Asc),
                ("timestamp".to_string(), Direction::Desc),
            ],
            unique: false,
        }],
        VECTOR_COLLECTION => vec![IndexSpec::Basic {
            name: "category_timestamp".to_string(),
            fields: vec![
                ("category".to_string(), Direction::Asc),
                ("timestamp".to_string(), Direction::Desc),
            ],
            unique: false,
        }],
        "users" => vec![
            IndexSpec::Basic {
                name: "user_id_unique".to_string(),
                fields: vec![("user_id".to_string(), Direction::Asc)],
                unique: true,
            },
            IndexSpec::Basic {
                name: "email".to_string(),
                fields: vec![("email".to_string(), Direction::Asc)],
                unique: false,
            },
        ],
        "feedback" => vec![IndexSpec::Basic {
            name: "chat_id_timestamp".to_string(),
            fields: vec![
                ("chat_id".to_string(), Direction::Asc),
                ("timestamp".to_string(), Direction::Desc),
            ],
            unique: false,
        }],
        _ => Vec::new(),
    }
}

/// Run the bootstrap against the store. `dims` is the encoder's output
/// dimensionality, baked into the similarity index definition.
pub async fn run(store: &StoreHandle, dims: usize) -> BootstrapReport {
    let remote = match store {
        StoreHandle::Connected(remote) => remote,
        StoreHandle::Degraded => {
            debug!("store degraded; schema bootstrap skipped");
            return BootstrapReport::skipped();
        }
    };

    let mut ok = true;
    let mut collections_ensured = 0;
    let mut indexes_ensured = 0;

    match remote.ensure_database().await {
        Ok(created) => {
            if created {
                info!(database = remote.database(), "database created");
            }
        }
        Err(e) => {
            error!("ensure database failed: {e}");
            ok = false;
        }
    }

    for collection in COLLECTIONS {
        match remote.ensure_collection(collection).await {
            Ok(created) => {
                collections_ensured += 1;
                if created {
                    info!(collection, "collection created");
                }
            }
            Err(e) => {
                error!(collection, "ensure collection failed: {e}");
                ok = false;
                continue;
            }
        }

        for spec in collection_indexes(collection) {
            match remote.create_index(collection, &spec).await {
                Ok(_) => indexes_ensured += 1,
                Err(e) => {
                    error!(collection, index = spec.name(), "create index failed: {e}");
                    ok = false;
                }
            }
        }
    }

    let vector_index = ensure_vector_index(remote, dims, &mut ok).await;

    BootstrapReport {
        ok,
        collections_ensured,
        indexes_ensured,
        vector_index,
    }
}

async fn ensure_vector_index(
    remote: &crate::store::RemoteStore,
    dims: usize,
    ok: &mut bool,
) -> VectorIndexState {
    let spec = IndexSpec::Vector {
        name: VECTOR_INDEX_NAME.to_string(),
        field: "embedding".to_string(),
        dimensions: dims,
    };

    match remote.create_index(VECTOR_COLLECTION, &spec).await {
        Ok(outcome) => {
            if outcome == IndexOutcome::Created {
                info!(index = VECTOR_INDEX_NAME, "similarity index created");
            }
            VectorIndexState::Ready
        }
        Err(crate::error::StoreError::Unsupported(detail)) => {
            warn!(
                "similarity indexes unavailable on this service tier ({detail}); \
                 using a basic index on the embedding field instead"
            );
            let fallback = IndexSpec::Basic {
                name: "embedding_basic".to_string(),
                fields: vec![("embedding".to_string(), Direction::Asc)],
                unique: false,
            };
            match remote.create_index(VECTOR_COLLECTION, &fallback).await {
                Ok(_) => VectorIndexState::FallbackBasic,
                Err(e) => {
                    error!("fallback embedding index failed: {e}");
                    *ok = false;
                    VectorIndexState::Skipped
                }
            }
        }
        Err(e) => {
            error!("similarity index creation failed: {e}");
            *ok = false;
            VectorIndexState::Skipped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RemoteStore;
    use mockito::Matcher;

    fn connected(server: &mockito::ServerGuard) -> StoreHandle {
        StoreHandle::Connected(RemoteStore::new(
            reqwest::Client::new(),
            server.url(),
            "lodestone".to_string(),
            None,
            "plaintext",
        ))
    }

    async fn mock_schema_routes(server: &mut mockito::ServerGuard, index_body: &str) {
        server
            .mock("PUT", Matcher::Regex("^/lodestone.*".to_string()))
            .with_status(201)
            .expect_at_least(1)
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex("/_index$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(index_body)
            .expect_at_least(1)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_full_bootstrap_reports_ready_vector_index() {
        let mut server = mockito::Server::new_async().await;
        mock_schema_routes(&mut server, r#"{"result":"created"}"#).await;

        let handle = connected(&server);
        let report = run(&handle, 384).await;

        assert!(report.ok);
        assert_eq!(report.collections_ensured, COLLECTIONS.len());
        // 5 basic secondary indexes across the four collections
        assert_eq!(report.indexes_ensured, 5);
        assert_eq!(report.vector_index, VectorIndexState::Ready);
    }

    #[tokio::test]
    async fn test_rerun_with_exists_answers_is_still_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", Matcher::Regex("^/lodestone.*".to_string()))
            .with_status(412)
            .expect_at_least(1)
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex("/_index$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"exists"}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let handle = connected(&server);
        let report = run(&handle, 384).await;
        assert!(report.ok, "already provisioned store must be a no-op success");
        assert_eq!(report.vector_index, VectorIndexState::Ready);
    }

    #[tokio::test]
    async fn test_unsupported_tier_falls_back_to_basic_index() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", Matcher::Regex("^/lodestone.*".to_string()))
            .with_status(201)
            .expect_at_least(1)
            .create_async()
            .await;
        // similarity index specs carry "type":"vector", basic specs carry
        // "unique"; body regexes keep the two mocks disjoint
        server
            .mock("POST", Matcher::Regex("/_index$".to_string()))
            .match_body(Matcher::Regex(r#""type":"vector""#.to_string()))
            .with_status(501)
            .with_body("Search index creation is not enabled")
            .expect(1)
            .create_async()
            .await;
        let basic = server
            .mock("POST", Matcher::Regex("/_index$".to_string()))
            .match_body(Matcher::Regex(r#""unique""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"created"}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let handle = connected(&server);
        let report = run(&handle, 384).await;

        assert!(report.ok, "tier limitation is not a failure");
        assert_eq!(report.vector_index, VectorIndexState::FallbackBasic);
        basic.assert_async().await;
    }

    #[tokio::test]
    async fn test_degraded_store_skips_everything() {
        let report = run(&StoreHandle::Degraded, 384).await;
        assert!(!report.ok);
        assert_eq!(report.collections_ensured, 0);
        assert_eq!(report.indexes_ensured, 0);
        assert_eq!(report.vector_index, VectorIndexState::Skipped);
    }
}
