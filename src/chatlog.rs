//! Chat transcript persistence.
//!
//! Exchanges are stored next to the vector corpus in the `chats`
//! collection so the consuming chat layer can replay history. Like every
//! store consumer, this rides the degraded-safe handle: with no live
//! connection, recording drops the entry and reads come back empty.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::bootstrap::CHATS_COLLECTION;
use crate::error::StoreError;
use crate::models::ChatEntry;
use crate::store::{FindQuery, StoreHandle};

pub struct ChatLog {
    store: Arc<StoreHandle>,
}

impl ChatLog {
    pub fn new(store: Arc<StoreHandle>) -> Self {
        Self { store }
    }

    /// Persist one exchange. Returns the stored id, or `None` when the
    /// store is degraded.
    pub async fn record(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
    ) -> Result<Option<String>, StoreError> {
        let entry = serde_json::json!({
            "_id": Uuid::new_v4().to_string(),
            "user_id": user_id,
            "user_message": user_message,
            "bot_response": bot_response,
            "timestamp": chrono::Utc::now(),
        });
        self.store.insert(CHATS_COLLECTION, &entry).await
    }

    /// A user's most recent exchanges, newest first.
    pub async fn history(&self, user_id: &str, limit: u64) -> Result<Vec<ChatEntry>, StoreError> {
        let query = FindQuery::selecting(serde_json::json!({ "user_id": user_id }))
            .sorted(serde_json::json!([{ "timestamp": "desc" }]))
            .limited(limit);
        let docs = self.store.find(CHATS_COLLECTION, &query).await?;
        Ok(docs.into_iter().filter_map(parse_entry).collect())
    }

    pub async fn by_id(&self, id: &str) -> Result<Option<ChatEntry>, StoreError> {
        let query = FindQuery::selecting(serde_json::json!({ "_id": id }));
        let doc = self.store.find_one(CHATS_COLLECTION, &query).await?;
        Ok(doc.and_then(parse_entry))
    }
}

fn parse_entry(doc: Value) -> Option<ChatEntry> {
    match serde_json::from_value(doc) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!("skipping malformed chat entry: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_degraded_record_returns_none() {
        let log = ChatLog::new(Arc::new(StoreHandle::Degraded));
        let id = log.record("u1", "hello", "hi there").await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn test_degraded_history_is_empty() {
        let log = ChatLog::new(Arc::new(StoreHandle::Degraded));
        assert!(log.history("u1", 10).await.unwrap().is_empty());
        assert!(log.by_id("some-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_parses_and_skips_malformed_entries() {
        use crate::store::RemoteStore;

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/lodestone/chats/_find")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"docs":[
                    {"_id":"c1","user_id":"u1","user_message":"hi","bot_response":"hello","timestamp":"2025-08-25T12:00:00Z"},
                    {"garbage":true}
                ]}"#,
            )
            .create_async()
            .await;

        let store = StoreHandle::Connected(RemoteStore::new(
            reqwest::Client::new(),
            server.url(),
            "lodestone".to_string(),
            None,
            "plaintext",
        ));
        let log = ChatLog::new(Arc::new(store));
        let entries = log.history("u1", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "c1");
        assert_eq!(entries[0].bot_response, "hello");
    }
}
