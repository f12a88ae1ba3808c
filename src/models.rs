//! Core data models for stored documents and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference document stored in `vector_embeddings`, carrying its
/// embedding vector alongside the text fields.
///
/// Embedding length always equals the encoder's output dimensionality;
/// documents are created on ingestion and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
}

/// A search hit: the displayable subset of a [`VectorDocument`] annotated
/// with its cosine similarity to the query. Constructed per query, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub title: String,
    pub content: String,
    pub category: String,
    pub score: f32,
}

/// One persisted chat exchange in the `chats` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}
