//! Remote document store client and the degraded-safe handle over it.
//!
//! The store speaks an HTTP/JSON dialect: `GET /_up` for liveness,
//! `PUT` create-or-412 for databases and collections, `_find` with a
//! selector/sort/limit body, `_index`, `_count`, and `_aggregate`. A tier
//! that cannot build similarity indexes answers `501`, surfaced as
//! [`StoreError::Unsupported`] so the bootstrapper can fall back.
//!
//! [`StoreHandle`] is the only surface callers see. It is selected once at
//! startup and never mutated: either `Connected` around a live
//! [`RemoteStore`], or `Degraded` with the identical operation set
//! returning empty/no-op values. Callers never branch on connectivity, and
//! a degraded handle never attempts reconnection; recovery is a process
//! restart.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;

/// Query body for `_find`: optional selector, sort, and limit.
/// Without a sort, the store returns documents in insertion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl FindQuery {
    /// Match every document, insertion order.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn selecting(selector: Value) -> Self {
        Self {
            selector: Some(selector),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limited(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Sort direction for basic index fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// An index definition sent to `_index`.
#[derive(Debug, Clone)]
pub enum IndexSpec {
    /// Ordinary secondary index over one or more fields.
    Basic {
        name: String,
        fields: Vec<(String, Direction)>,
        unique: bool,
    },
    /// Similarity index over an embedding field, cosine distance.
    Vector {
        name: String,
        field: String,
        dimensions: usize,
    },
}

impl IndexSpec {
    pub fn name(&self) -> &str {
        match self {
            IndexSpec::Basic { name, .. } => name,
            IndexSpec::Vector { name, .. } => name,
        }
    }

    /// Wire body for `_index`.
    pub fn body(&self) -> Value {
        match self {
            IndexSpec::Basic {
                name,
                fields,
                unique,
            } => {
                let fields: Vec<Value> = fields
                    .iter()
                    .map(|(field, dir)| serde_json::json!({ field: dir.as_str() }))
                    .collect();
                serde_json::json!({ "name": name, "fields": fields, "unique": unique })
            }
            IndexSpec::Vector {
                name,
                field,
                dimensions,
            } => serde_json::json!({
                "name": name,
                "type": "vector",
                "field": field,
                "dimensions": dimensions,
                "similarity": "cosine",
            }),
        }
    }
}

/// Result of a create-index call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    Exists,
    /// Store is degraded; nothing was attempted.
    Skipped,
}

/// A live, probed connection to the document store.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    database: String,
    auth: Option<(String, String)>,
    strategy: &'static str,
}

impl RemoteStore {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        database: String,
        auth: Option<(String, String)>,
        strategy: &'static str,
    ) -> Self {
        Self {
            client,
            base_url,
            database,
            auth,
            strategy,
        }
    }

    /// Name of the connection strategy that produced this store.
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.client.put(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    /// Explicit liveness probe. A socket opening is not enough to accept a
    /// connection strategy; this must return success.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let resp = self.get("/_up").send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                detail: "liveness probe failed".to_string(),
            });
        }
        Ok(())
    }

    /// `PUT /{db}`: `Ok(true)` created now, `Ok(false)` already existed.
    pub async fn ensure_database(&self) -> Result<bool, StoreError> {
        let resp = self.put(&format!("/{}", self.database)).send().await?;
        Self::created_or_exists(resp).await
    }

    /// `PUT /{db}/{collection}`: `Ok(true)` created now, `Ok(false)` existed.
    pub async fn ensure_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let resp = self
            .put(&format!("/{}/{}", self.database, collection))
            .send()
            .await?;
        Self::created_or_exists(resp).await
    }

    async fn created_or_exists(resp: reqwest::Response) -> Result<bool, StoreError> {
        let status = resp.status();
        match status.as_u16() {
            201 => Ok(true),
            412 => Ok(false),
            _ if status.is_success() => Ok(false),
            _ => Err(rejected(resp).await),
        }
    }

    pub async fn insert(&self, collection: &str, doc: &Value) -> Result<String, StoreError> {
        let resp = self
            .post(&format!("/{}/{}", self.database, collection))
            .json(doc)
            .send()
            .await?;
        let body = expect_success(resp).await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Malformed("insert response missing 'id'".to_string()))
    }

    pub async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<Value>, StoreError> {
        let resp = self
            .post(&format!("/{}/{}/_find", self.database, collection))
            .json(query)
            .send()
            .await?;
        let body = expect_success(resp).await?;
        let docs = body
            .get("docs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| StoreError::Malformed("find response missing 'docs'".to_string()))?;
        Ok(docs.clone())
    }

    pub async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let resp = self
            .get(&format!("/{}/{}/_count", self.database, collection))
            .send()
            .await?;
        let body = expect_success(resp).await?;
        body.get("count")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| StoreError::Malformed("count response missing 'count'".to_string()))
    }

    pub async fn create_index(
        &self,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<IndexOutcome, StoreError> {
        let resp = self
            .post(&format!("/{}/{}/_index", self.database, collection))
            .json(&spec.body())
            .send()
            .await?;
        let body = expect_success(resp).await?;
        match body.get("result").and_then(|v| v.as_str()) {
            Some("created") => Ok(IndexOutcome::Created),
            Some("exists") => Ok(IndexOutcome::Exists),
            other => Err(StoreError::Malformed(format!(
                "unexpected index result: {other:?}"
            ))),
        }
    }

    pub async fn aggregate(
        &self,
        collection: &str,
        stages: &[Value],
    ) -> Result<Vec<Value>, StoreError> {
        let resp = self
            .post(&format!("/{}/{}/_aggregate", self.database, collection))
            .json(&serde_json::json!({ "stages": stages }))
            .send()
            .await?;
        let body = expect_success(resp).await?;
        let results = body.get("results").and_then(|v| v.as_array()).ok_or_else(|| {
            StoreError::Malformed("aggregate response missing 'results'".to_string())
        })?;
        Ok(results.clone())
    }
}

/// Map a response to JSON, converting 501 to `Unsupported` and other
/// non-success statuses to `Rejected`.
async fn expect_success(resp: reqwest::Response) -> Result<Value, StoreError> {
    let status = resp.status();
    if status.as_u16() == 501 {
        let detail = resp.text().await.unwrap_or_default();
        return Err(StoreError::Unsupported(detail));
    }
    if !status.is_success() {
        return Err(rejected(resp).await);
    }
    resp.json::<Value>()
        .await
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

async fn rejected(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let detail = resp.text().await.unwrap_or_default();
    StoreError::Rejected { status, detail }
}

/// The store handle held for the life of the process.
///
/// `Degraded` operations log at `debug!` rather than `warn!` so every chat
/// request does not spam the log; degraded-mode entry itself was already
/// logged once at startup.
#[derive(Debug)]
pub enum StoreHandle {
    Connected(RemoteStore),
    Degraded,
}

impl StoreHandle {
    pub fn is_degraded(&self) -> bool {
        matches!(self, StoreHandle::Degraded)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            StoreHandle::Connected(_) => "connected",
            StoreHandle::Degraded => "degraded",
        }
    }

    /// Insert a document. Degraded: `Ok(None)`, nothing stored.
    pub async fn insert(
        &self,
        collection: &str,
        doc: &Value,
    ) -> Result<Option<String>, StoreError> {
        match self {
            StoreHandle::Connected(store) => store.insert(collection, doc).await.map(Some),
            StoreHandle::Degraded => {
                debug!(collection, "store degraded; insert dropped");
                Ok(None)
            }
        }
    }

    /// Find documents. Degraded: empty.
    pub async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<Value>, StoreError> {
        match self {
            StoreHandle::Connected(store) => store.find(collection, query).await,
            StoreHandle::Degraded => {
                debug!(collection, "store degraded; find returns empty");
                Ok(Vec::new())
            }
        }
    }

    /// Find at most one document. Degraded: `None`.
    pub async fn find_one(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Option<Value>, StoreError> {
        let mut query = query.clone();
        query.limit = Some(1);
        Ok(self.find(collection, &query).await?.into_iter().next())
    }

    /// Count documents. Degraded: 0.
    pub async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        match self {
            StoreHandle::Connected(store) => store.count(collection).await,
            StoreHandle::Degraded => {
                debug!(collection, "store degraded; count returns 0");
                Ok(0)
            }
        }
    }

    /// Create an index. Degraded: `Skipped`.
    pub async fn create_index(
        &self,
        collection: &str,
        spec: &IndexSpec,
    ) -> Result<IndexOutcome, StoreError> {
        match self {
            StoreHandle::Connected(store) => store.create_index(collection, spec).await,
            StoreHandle::Degraded => {
                debug!(collection, index = spec.name(), "store degraded; index skipped");
                Ok(IndexOutcome::Skipped)
            }
        }
    }

    /// Run an aggregation pipeline. Degraded: empty.
    pub async fn aggregate(
        &self,
        collection: &str,
        stages: &[Value],
    ) -> Result<Vec<Value>, StoreError> {
        match self {
            StoreHandle::Connected(store) => store.aggregate(collection, stages).await,
            StoreHandle::Degraded => {
                debug!(collection, "store degraded; aggregate returns empty");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store_for(server: &mockito::ServerGuard) -> RemoteStore {
        RemoteStore::new(
            reqwest::Client::new(),
            server.url(),
            "lodestone".to_string(),
            None,
            "plaintext",
        )
    }

    #[test]
    fn test_basic_index_body_shape() {
        let spec = IndexSpec::Basic {
            name: "user_id_timestamp".to_string(),
            fields: vec![
                ("user_id".to_string(), Direction::Asc),
                ("timestamp".to_string(), Direction::Desc),
            ],
            unique: false,
        };
        let body = spec.body();
        assert_eq!(body["name"], "user_id_timestamp");
        assert_eq!(body["fields"][0]["user_id"], "asc");
        assert_eq!(body["fields"][1]["timestamp"], "desc");
        assert_eq!(body["unique"], false);
    }

    #[test]
    fn test_vector_index_body_shape() {
        let spec = IndexSpec::Vector {
            name: "vector_search".to_string(),
            field: "embedding".to_string(),
            dimensions: 384,
        };
        let body = spec.body();
        assert_eq!(body["type"], "vector");
        assert_eq!(body["field"], "embedding");
        assert_eq!(body["dimensions"], 384);
        assert_eq!(body["similarity"], "cosine");
    }

    #[test]
    fn test_find_query_serialization_omits_unset_fields() {
        let body = serde_json::to_value(FindQuery::all()).unwrap();
        assert_eq!(body, serde_json::json!({}));

        let body = serde_json::to_value(
            FindQuery::selecting(serde_json::json!({"user_id": "u1"}))
                .sorted(serde_json::json!([{"timestamp": "desc"}]))
                .limited(10),
        )
        .unwrap();
        assert_eq!(body["selector"]["user_id"], "u1");
        assert_eq!(body["limit"], 10);
    }

    #[tokio::test]
    async fn test_insert_parses_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/lodestone/chats")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"abc-123"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let id = store
            .insert("chats", &serde_json::json!({"user_id": "u1"}))
            .await
            .unwrap();
        assert_eq!(id, "abc-123");
    }

    #[tokio::test]
    async fn test_find_returns_docs() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/lodestone/chats/_find")
            .match_body(Matcher::PartialJson(serde_json::json!({"limit": 2})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"docs":[{"a":1},{"a":2}]}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let docs = store
            .find("chats", &FindQuery::all().limited(2))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_create_index_maps_501_to_unsupported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/lodestone/vector_embeddings/_index")
            .with_status(501)
            .with_body("Search index creation is not enabled")
            .create_async()
            .await;

        let store = store_for(&server);
        let spec = IndexSpec::Vector {
            name: "vector_search".to_string(),
            field: "embedding".to_string(),
            dimensions: 384,
        };
        let err = store.create_index("vector_embeddings", &spec).await.unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_ensure_collection_treats_412_as_existing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/lodestone/chats")
            .with_status(412)
            .create_async()
            .await;

        let store = store_for(&server);
        let created = store.ensure_collection("chats").await.unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn test_rejected_status_carries_detail() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/lodestone/chats/_count")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store.count("chats").await.unwrap_err();
        match err {
            StoreError::Rejected { status, detail } => {
                assert_eq!(status, 403);
                assert_eq!(detail, "forbidden");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_degraded_surface_is_empty_and_non_failing() {
        let handle = StoreHandle::Degraded;
        assert!(handle.is_degraded());
        assert_eq!(handle.mode(), "degraded");
        assert_eq!(
            handle
                .insert("chats", &serde_json::json!({}))
                .await
                .unwrap(),
            None
        );
        assert!(handle.find("chats", &FindQuery::all()).await.unwrap().is_empty());
        assert_eq!(handle.find_one("chats", &FindQuery::all()).await.unwrap(), None);
        assert_eq!(handle.count("chats").await.unwrap(), 0);
        assert!(handle.aggregate("chats", &[]).await.unwrap().is_empty());
        let spec = IndexSpec::Basic {
            name: "x".to_string(),
            fields: vec![("a".to_string(), Direction::Asc)],
            unique: false,
        };
        assert_eq!(
            handle.create_index("chats", &spec).await.unwrap(),
            IndexOutcome::Skipped
        );
    }
}
