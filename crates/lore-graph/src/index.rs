//! Document index seam and the Chroma-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;
use lore_ai::Embedder;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// A fragment returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Text content of the fragment
    pub content: String,
    /// Distance reported by the index, smaller is closer
    pub score: Option<f32>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score: None,
        }
    }
}

/// A queryable index of document fragments.
///
/// Implementations return at most `k` documents, most relevant first.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>>;
}

/// Chroma server location and collection
#[derive(Debug, Clone)]
pub struct ChromaConfig {
    /// Server URL, e.g. `http://localhost:8000`
    pub url: String,
    pub tenant: String,
    pub database: String,
    pub collection: String,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            collection: "documents".to_string(),
        }
    }
}

/// Document index served by a Chroma server over its v2 REST API.
///
/// Queries are embedded client-side with the supplied [`Embedder`], which
/// must match the model the collection was populated with.
pub struct ChromaIndex {
    client: reqwest::Client,
    config: ChromaConfig,
    embedder: Arc<dyn Embedder>,
    collection_id: Mutex<Option<String>>,
}

impl ChromaIndex {
    pub fn new(config: ChromaConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: ChromaConfig {
                url: config.url.trim_end_matches('/').to_string(),
                ..config
            },
            embedder,
            collection_id: Mutex::new(None),
        }
    }

    fn database_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}",
            self.config.url, self.config.tenant, self.config.database
        )
    }

    /// Look up the collection id by name, caching it once found.
    async fn collection_id(&self) -> Result<String> {
        if let Some(id) = self.collection_id.lock().clone() {
            return Ok(id);
        }

        let url = format!("{}/collections/{}", self.database_url(), self.config.collection);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                Error::Index(format!("failed to reach Chroma at {}: {}", self.config.url, e))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::Index(format!(
                "collection '{}' does not exist yet",
                self.config.collection
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Index(format!(
                "collection lookup failed ({}): {}",
                status, text
            )));
        }

        let collection: CollectionInfo = response
            .json()
            .await
            .map_err(|e| Error::Index(format!("invalid collection response: {}", e)))?;

        *self.collection_id.lock() = Some(collection.id.clone());
        Ok(collection.id)
    }

    /// Drop the cached collection id so the next lookup resolves it again
    fn forget_collection_id(&self) {
        *self.collection_id.lock() = None;
    }

    /// Run one query against `collection_id`. A rejection by the server is
    /// returned as an outcome so the caller can re-resolve the collection.
    async fn query(
        &self,
        collection_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryOutcome> {
        let url = format!("{}/collections/{}/query", self.database_url(), collection_id);
        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "distances"],
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Index(format!("query failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Ok(QueryOutcome::Rejected(status, text));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Index(format!("invalid query response: {}", e)))?;

        Ok(QueryOutcome::Found(result.into_documents(k)))
    }
}

#[async_trait]
impl DocumentIndex for ChromaIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let embedding = self.embedder.embed_query(query).await?;
        let collection_id = self.collection_id().await?;

        let (status, text) = match self.query(&collection_id, &embedding, k).await? {
            QueryOutcome::Found(documents) => return Ok(documents),
            QueryOutcome::Rejected(status, text) => (status, text),
        };

        // The collection may have been deleted and recreated under a new id
        tracing::warn!(
            "Query against collection {} failed ({}), resolving '{}' again",
            collection_id,
            status,
            self.config.collection
        );
        self.forget_collection_id();
        let fresh_id = self.collection_id().await?;
        if fresh_id == collection_id {
            return Err(Error::Index(format!("query failed ({}): {}", status, text)));
        }

        match self.query(&fresh_id, &embedding, k).await? {
            QueryOutcome::Found(documents) => Ok(documents),
            QueryOutcome::Rejected(status, text) => {
                self.forget_collection_id();
                Err(Error::Index(format!("query failed ({}): {}", status, text)))
            }
        }
    }
}

enum QueryOutcome {
    Found(Vec<Document>),
    Rejected(reqwest::StatusCode, String),
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Chroma answers with one inner list per query embedding; we send exactly one.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    fn into_documents(self, k: usize) -> Vec<Document> {
        let documents = self
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let distances = self
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        documents
            .into_iter()
            .enumerate()
            .filter_map(|(i, content)| {
                content.map(|content| Document {
                    content,
                    score: distances.get(i).copied().flatten(),
                })
            })
            .take(k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_preserves_rank_order() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "ids": [["c", "a", "b"]],
            "documents": [["closest", "middle", "farthest"]],
            "distances": [[0.1, 0.4, 0.9]]
        }))
        .unwrap();

        let docs = response.into_documents(5);
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["closest", "middle", "farthest"]);
        assert_eq!(docs[0].score, Some(0.1));
    }

    #[test]
    fn test_query_response_skips_null_documents_and_caps_k() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "documents": [["one", null, "two", "three"]],
            "distances": [[0.1, 0.2, 0.3, 0.4]]
        }))
        .unwrap();

        let docs = response.into_documents(2);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].content, "two");
        assert_eq!(docs[1].score, Some(0.3));
    }

    #[test]
    fn test_query_response_without_documents_is_empty() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(response.into_documents(5).is_empty());
    }

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        fn model_name(&self) -> &str {
            "null"
        }
        async fn embed(&self, texts: &[String]) -> lore_ai::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    #[test]
    fn test_url_trailing_slash_is_trimmed() {
        let index = ChromaIndex::new(
            ChromaConfig {
                url: "http://chroma:8000/".into(),
                ..Default::default()
            },
            Arc::new(NullEmbedder),
        );
        assert_eq!(
            index.database_url(),
            "http://chroma:8000/api/v2/tenants/default_tenant/databases/default_database"
        );
    }

    mod server {
        use super::*;
        use axum::{
            Json, Router,
            extract::{Path, State},
            http::StatusCode,
            response::{IntoResponse, Response},
            routing::{get, post},
        };
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// In-process Chroma answering for whichever collection id is live.
        #[derive(Clone, Default)]
        struct FakeChroma {
            live_id: Arc<Mutex<Option<String>>>,
            lookups: Arc<AtomicUsize>,
        }

        impl FakeChroma {
            fn recreate(&self, id: &str) {
                *self.live_id.lock() = Some(id.to_string());
            }

            fn delete(&self) {
                *self.live_id.lock() = None;
            }
        }

        async fn get_collection(
            State(chroma): State<FakeChroma>,
            Path((_tenant, _database, name)): Path<(String, String, String)>,
        ) -> Response {
            chroma.lookups.fetch_add(1, Ordering::SeqCst);
            let live = chroma.live_id.lock().clone();
            match live {
                Some(id) => Json(serde_json::json!({ "id": id, "name": name })).into_response(),
                None => (StatusCode::NOT_FOUND, "collection not found").into_response(),
            }
        }

        async fn query_collection(
            State(chroma): State<FakeChroma>,
            Path((_tenant, _database, id)): Path<(String, String, String)>,
        ) -> Response {
            let live = chroma.live_id.lock().clone();
            if live.as_deref() == Some(id.as_str()) {
                Json(serde_json::json!({
                    "documents": [[format!("fragment from {}", id)]],
                    "distances": [[0.1]]
                }))
                .into_response()
            } else {
                (StatusCode::NOT_FOUND, format!("collection {} does not exist", id)).into_response()
            }
        }

        async fn spawn(chroma: FakeChroma) -> String {
            let prefix = "/api/v2/tenants/{tenant}/databases/{database}/collections/{name}";
            let app = Router::new()
                .route(prefix, get(get_collection))
                .route(&format!("{}/query", prefix), post(query_collection))
                .with_state(chroma);

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}", addr)
        }

        fn index_at(url: String) -> ChromaIndex {
            ChromaIndex::new(
                ChromaConfig {
                    url,
                    ..Default::default()
                },
                Arc::new(NullEmbedder),
            )
        }

        #[tokio::test]
        async fn test_collection_id_is_cached_between_queries() {
            let chroma = FakeChroma::default();
            chroma.recreate("first-id");
            let index = index_at(spawn(chroma.clone()).await);

            index.similarity_search("q", 5).await.unwrap();
            index.similarity_search("q", 5).await.unwrap();

            assert_eq!(chroma.lookups.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_recovers_after_collection_is_recreated() {
            let chroma = FakeChroma::default();
            chroma.recreate("old-id");
            let index = index_at(spawn(chroma.clone()).await);

            let docs = index.similarity_search("q", 5).await.unwrap();
            assert_eq!(docs[0].content, "fragment from old-id");

            chroma.recreate("new-id");

            for _ in 0..3 {
                let docs = index.similarity_search("q", 5).await.unwrap();
                assert_eq!(docs[0].content, "fragment from new-id");
            }
            assert_eq!(chroma.lookups.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_deleted_collection_is_resolved_again_once_it_returns() {
            let chroma = FakeChroma::default();
            chroma.recreate("old-id");
            let index = index_at(spawn(chroma.clone()).await);
            index.similarity_search("q", 5).await.unwrap();

            chroma.delete();
            let err = index.similarity_search("q", 5).await.unwrap_err();
            assert!(matches!(err, Error::Index(_)));
            assert!(index.collection_id.lock().is_none());

            chroma.recreate("new-id");
            let docs = index.similarity_search("q", 5).await.unwrap();
            assert_eq!(docs[0].content, "fragment from new-id");
        }
    }
}
