//! Similarity search and document ingestion.
//!
//! [`Retriever`] is the query surface the chat layer consumes. Every
//! search call — success or failure — reports to [`RetrievalMetrics`]
//! exactly once, and no failure escapes as an error: an unreachable store
//! or a failed embedding produces an empty result list, so the consuming
//! layer proceeds without retrieved context instead of failing the
//! user-facing request. Ingestion does return errors, because the caller
//! needs to distinguish a rejected document from an unavailable store.
//!
//! Candidate embeddings are fetched in insertion order and ranked in
//! process with a stable descending sort, so score ties keep
//! earliest-inserted-first order.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bootstrap::VECTOR_COLLECTION;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::RetrievalError;
use crate::metrics::RetrievalMetrics;
use crate::models::ScoredDocument;
use crate::store::{FindQuery, StoreHandle};

/// Minimum content length for an ingested document. Shorter fragments
/// embed poorly and pollute retrieval.
pub const MIN_CONTENT_CHARS: usize = 50;

/// Query and ingestion engine over the vector corpus.
pub struct Retriever {
    store: Arc<StoreHandle>,
    embedder: Arc<dyn Embedder>,
    metrics: Arc<RetrievalMetrics>,
    default_limit: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<StoreHandle>,
        embedder: Arc<dyn Embedder>,
        metrics: Arc<RetrievalMetrics>,
        default_limit: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            metrics,
            default_limit,
        }
    }

    pub fn metrics(&self) -> &RetrievalMetrics {
        &self.metrics
    }

    /// Return the `limit` most similar documents to `query`, descending by
    /// cosine score. A limit beyond the corpus size returns the whole
    /// corpus. Never errors: embedding or store failures are recorded as
    /// failed searches and yield an empty list.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<ScoredDocument> {
        let limit = limit.unwrap_or(self.default_limit);
        let started = Instant::now();

        let query_vec = match self.embedder.embed(query) {
            Ok(v) => v,
            Err(e) => {
                warn!("query embedding failed: {e}");
                self.metrics.record_failure(started.elapsed());
                return Vec::new();
            }
        };

        if self.store.is_degraded() {
            debug!("store degraded; search returns empty");
            self.metrics.record_failure(started.elapsed());
            return Vec::new();
        }

        let candidates = match self.store.find(VECTOR_COLLECTION, &FindQuery::all()).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("candidate fetch failed: {e}");
                self.metrics.record_failure(started.elapsed());
                return Vec::new();
            }
        };

        let results = rank_candidates(&query_vec, &candidates, limit);
        self.metrics.record_success(started.elapsed());
        debug!(
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        results
    }

    /// Validate, embed, and store one document. `Ok(true)` when persisted,
    /// `Ok(false)` when the store is degraded and nothing could be stored.
    pub async fn ingest(
        &self,
        title: &str,
        content: &str,
        category: &str,
    ) -> Result<bool, RetrievalError> {
        if title.trim().is_empty() {
            return Err(RetrievalError::InvalidDocument(
                "title must not be empty".to_string(),
            ));
        }
        if category.trim().is_empty() {
            return Err(RetrievalError::InvalidDocument(
                "category must not be empty".to_string(),
            ));
        }
        if content.chars().count() < MIN_CONTENT_CHARS {
            return Err(RetrievalError::InvalidDocument(format!(
                "content must be at least {MIN_CONTENT_CHARS} characters"
            )));
        }

        let embedding = self.embedder.embed(content)?;

        let doc = serde_json::json!({
            "_id": Uuid::new_v4().to_string(),
            "title": title,
            "content": content,
            "category": category,
            "embedding": embedding,
            "timestamp": chrono::Utc::now(),
        });

        match self.store.insert(VECTOR_COLLECTION, &doc).await? {
            Some(id) => {
                debug!(id, title, "document ingested");
                Ok(true)
            }
            None => {
                debug!(title, "store degraded; document not persisted");
                Ok(false)
            }
        }
    }
}

/// Score candidates against the query vector and keep the top `limit`.
///
/// The sort is stable and candidates arrive in insertion order, so equal
/// scores rank earliest-inserted first. Candidates with a missing or
/// mismatched embedding score 0.0 and sink to the bottom instead of
/// failing the search.
fn rank_candidates(query_vec: &[f32], candidates: &[Value], limit: usize) -> Vec<ScoredDocument> {
    let mut scored: Vec<ScoredDocument> = candidates
        .iter()
        .map(|doc| {
            let embedding: Vec<f32> = doc
                .get("embedding")
                .and_then(|e| e.as_array())
                .map(|a| a.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
                .unwrap_or_default();
            ScoredDocument {
                title: text_field(doc, "title"),
                content: text_field(doc, "content"),
                category: text_field(doc, "category"),
                score: cosine_similarity(query_vec, &embedding),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

fn text_field(doc: &Value, field: &str) -> String {
    doc.get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
