//! Starter corpus seeding.
//!
//! `init` inserts a small reference corpus into an empty
//! `vector_embeddings` collection so retrieval has something to ground
//! against before any real documents are uploaded. Seeding a non-empty
//! corpus is a no-op, which keeps `init` idempotent.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bootstrap::VECTOR_COLLECTION;
use crate::embedding::Embedder;
use crate::store::StoreHandle;

/// The five starter documents: regenerative-medicine clinic content.
pub const SEED_DOCUMENTS: [(&str, &str, &str); 5] = [
    (
        "Introduction to Stem Cell Therapy",
        "Stem cell therapy is a form of regenerative medicine that uses stem cells or their \
         derivatives to promote the repair response of diseased, dysfunctional or injured \
         tissue. Auragens specializes in using Mesenchymal Stem Cells (MSCs) from Wharton's \
         Jelly tissue for optimal therapeutic results.",
        "general",
    ),
    (
        "MSC Harvesting Procedure",
        "MSCs are harvested using a minimally invasive procedure from Wharton's Jelly, the \
         gelatinous tissue from the umbilical cord. This ensures high cell viability and \
         minimal discomfort compared to other harvesting methods such as bone marrow \
         extraction.",
        "procedures",
    ),
    (
        "Treatment Areas",
        "MSCs are used in treating orthopedic, autoimmune, and cardiovascular conditions. \
         They are also applied in neurological and pulmonary therapies. At Auragens, we focus \
         on evidence-based applications with documented clinical outcomes.",
        "treatments",
    ),
    (
        "Auragens Leadership",
        "Auragens is led by Dr. Dan Briggs, CEO, who has extensive experience in regenerative \
         medicine and stem cell therapies. Under his leadership, Auragens has become a leader \
         in providing high-quality Mesenchymal Stem Cell treatments derived from Wharton's \
         Jelly tissue.",
        "company",
    ),
    (
        "Contact Information",
        "For more information about Auragens and our stem cell therapy options, please visit \
         our website at www.auragens.com or contact Dr. Dan Briggs directly for personalized \
         consultation on treatment options for your specific condition.",
        "contact",
    ),
];

/// What the seeding step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Corpus was empty; this many documents were inserted.
    Seeded(usize),
    /// Corpus already holds this many documents; nothing inserted.
    AlreadyPopulated(u64),
    /// Store degraded; nothing attempted.
    Unavailable,
}

/// Insert the starter corpus if `vector_embeddings` is empty.
pub async fn seed_if_empty(
    store: &Arc<StoreHandle>,
    embedder: &Arc<dyn Embedder>,
) -> Result<SeedOutcome> {
    if store.is_degraded() {
        debug!("store degraded; seeding skipped");
        return Ok(SeedOutcome::Unavailable);
    }

    let existing = store.count(VECTOR_COLLECTION).await?;
    if existing > 0 {
        debug!(existing, "corpus already populated; seeding skipped");
        return Ok(SeedOutcome::AlreadyPopulated(existing));
    }

    let mut inserted = 0;
    for (title, content, category) in SEED_DOCUMENTS {
        let embedding = match embedder.embed(content) {
            Ok(v) => v,
            Err(e) => {
                warn!(title, "seed document embedding failed: {e}");
                continue;
            }
        };
        let doc = json!({
            "_id": Uuid::new_v4().to_string(),
            "title": title,
            "content": content,
            "category": category,
            "embedding": embedding,
            "timestamp": chrono::Utc::now(),
        });
        match store.insert(VECTOR_COLLECTION, &doc).await {
            Ok(Some(_)) => inserted += 1,
            Ok(None) => {}
            Err(e) => warn!(title, "seed document insert failed: {e}"),
        }
    }

    info!(inserted, "starter corpus seeded");
    Ok(SeedOutcome::Seeded(inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::retrieval::MIN_CONTENT_CHARS;

    #[test]
    fn test_seed_documents_pass_ingest_validation() {
        for (title, content, category) in SEED_DOCUMENTS {
            assert!(!title.trim().is_empty());
            assert!(!category.trim().is_empty());
            assert!(
                content.chars().count() >= MIN_CONTENT_CHARS,
                "{title} content too short"
            );
        }
    }

    #[test]
    fn test_seed_categories_are_distinct() {
        let mut categories: Vec<&str> = SEED_DOCUMENTS.iter().map(|(_, _, c)| *c).collect();
        categories.sort_unstable();
        categories.dedup();
        assert_eq!(categories.len(), SEED_DOCUMENTS.len());
    }

    #[tokio::test]
    async fn test_degraded_store_skips_seeding() {
        let store: Arc<StoreHandle> = Arc::new(StoreHandle::Degraded);
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new(384, 2048));
        let outcome = seed_if_empty(&store, &embedder).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Unavailable);
    }

    #[tokio::test]
    async fn test_populated_corpus_is_left_alone() {
        use crate::store::RemoteStore;

        let mut server = mockito::Server::new_async().await;
        let _count = server
            .mock("GET", "/lodestone/vector_embeddings/_count")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"count":7}"#)
            .create_async()
            .await;

        let store: Arc<StoreHandle> = Arc::new(StoreHandle::Connected(RemoteStore::new(
            reqwest::Client::new(),
            server.url(),
            "lodestone".to_string(),
            None,
            "plaintext",
        )));
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new(384, 2048));
        let outcome = seed_if_empty(&store, &embedder).await.unwrap();
        assert_eq!(outcome, SeedOutcome::AlreadyPopulated(7));
    }

    #[tokio::test]
    async fn test_empty_corpus_gets_all_five_documents() {
        use crate::store::RemoteStore;

        let mut server = mockito::Server::new_async().await;
        let _count = server
            .mock("GET", "/lodestone/vector_embeddings/_count")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"count":0}"#)
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/lodestone/vector_embeddings")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"seeded"}"#)
            .expect(5)
            .create_async()
            .await;

        let store: Arc<StoreHandle> = Arc::new(StoreHandle::Connected(RemoteStore::new(
            reqwest::Client::new(),
            server.url(),
            "lodestone".to_string(),
            None,
            "plaintext",
        )));
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new(384, 2048));
        let outcome = seed_if_empty(&store, &embedder).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Seeded(5));
        insert.assert_async().await;
    }
}
