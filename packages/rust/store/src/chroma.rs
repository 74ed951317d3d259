//! Chroma HTTP client.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use ragforge_shared::{RagForgeError, Result};

use crate::{
    MetadataFilter, QueryMatch, StoredChunk, VectorStore, distance_to_similarity, upsert_batches,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Vector store backed by a Chroma server's v1 REST API.
pub struct ChromaStore {
    client: Client,
    base_url: String,
    /// Collection name to server-side id. Chroma addresses collections by
    /// id on every call after creation.
    collection_ids: Mutex<HashMap<String, String>>,
}

impl ChromaStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagForgeError::Store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve a collection name to its id, creating the collection with
    /// cosine distance on first use.
    async fn collection_id(&self, name: &str) -> Result<String> {
        {
            let ids = self.collection_ids.lock().await;
            if let Some(id) = ids.get(name) {
                return Ok(id.clone());
            }
        }

        let body = json!({
            "name": name,
            "get_or_create": true,
            // Pinned at creation: all similarity math assumes cosine.
            "metadata": {"hnsw:space": "cosine"},
        });

        let response = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagForgeError::Store(format!("create collection {name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagForgeError::Store(format!(
                "create collection {name}: HTTP {status}"
            )));
        }

        #[derive(Deserialize)]
        struct Collection {
            id: String,
        }

        let collection: Collection = response
            .json()
            .await
            .map_err(|e| RagForgeError::Store(format!("create collection {name}: {e}")))?;

        debug!(collection = name, id = %collection.id, "resolved collection");

        let mut ids = self.collection_ids.lock().await;
        ids.insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }
}

#[async_trait::async_trait]
impl VectorStore for ChromaStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.collection_id(name).await.map(|_| ())
    }

    #[instrument(skip_all, fields(collection = %collection, chunks = chunks.len()))]
    async fn upsert(&self, collection: &str, chunks: &[StoredChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let id = self.collection_id(collection).await?;
        let url = format!("{}/api/v1/collections/{id}/upsert", self.base_url);
        let mut requests = 0;

        for batch in upsert_batches(chunks) {
            let body = json!({
                "ids": batch.iter().map(|c| &c.id).collect::<Vec<_>>(),
                "documents": batch.iter().map(|c| &c.document).collect::<Vec<_>>(),
                "embeddings": batch.iter().map(|c| &c.embedding).collect::<Vec<_>>(),
                "metadatas": batch.iter().map(|c| &c.metadata).collect::<Vec<_>>(),
            });

            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| RagForgeError::Store(format!("upsert into {collection}: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RagForgeError::Store(format!(
                    "upsert into {collection}: HTTP {status}"
                )));
            }

            requests += 1;
            debug!(batch = requests, size = batch.len(), "upsert batch stored");
        }

        info!(collection, chunks = chunks.len(), requests, "upsert complete");
        Ok(requests)
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let id = self.collection_id(collection).await?;

        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = json!(filter);
        }

        let response = self
            .client
            .post(format!("{}/api/v1/collections/{id}/query", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagForgeError::Store(format!("query {collection}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagForgeError::Store(format!(
                "query {collection}: HTTP {status}"
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RagForgeError::Store(format!("query {collection}: {e}")))?;

        // Chroma nests results per query embedding; we send exactly one.
        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        let matches = ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, document), metadata), distance)| QueryMatch {
                id,
                document: document.unwrap_or_default(),
                metadata: metadata.unwrap_or_default(),
                distance,
                similarity: distance_to_similarity(distance),
            })
            .collect();

        Ok(matches)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/api/v1/collections/{name}", self.base_url))
            .send()
            .await
            .map_err(|e| RagForgeError::Store(format!("delete collection {name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagForgeError::Store(format!(
                "delete collection {name}: HTTP {status}"
            )));
        }

        self.collection_ids.lock().await.remove(name);
        info!(collection = name, "collection deleted");
        Ok(())
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<BTreeMap<String, String>>>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_UPSERT_BATCH;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_collection(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/collections"))
            .and(body_partial_json(json!({
                "metadata": {"hnsw:space": "cosine"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "col-1", "name": "docs"})),
            )
            .mount(server)
            .await;
    }

    fn chunk(id: &str) -> StoredChunk {
        StoredChunk {
            id: id.to_string(),
            document: format!("doc {id}"),
            embedding: vec![0.1, 0.2],
            metadata: BTreeMap::from([("source".to_string(), "test".to_string())]),
        }
    }

    #[tokio::test]
    async fn creates_cosine_collection_once() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "col-1", "name": "docs"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = ChromaStore::new(&server.uri()).unwrap();
        store.ensure_collection("docs").await.unwrap();
        // Second call hits the cache, not the server.
        store.ensure_collection("docs").await.unwrap();
    }

    #[tokio::test]
    async fn upsert_splits_large_batches() {
        let server = MockServer::start().await;
        mount_collection(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/upsert"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let chunks: Vec<StoredChunk> = (0..MAX_UPSERT_BATCH + 5)
            .map(|i| chunk(&format!("c{i}")))
            .collect();

        let store = ChromaStore::new(&server.uri()).unwrap();
        let requests = store.upsert("docs", &chunks).await.unwrap();
        assert_eq!(requests, 2);
    }

    #[tokio::test]
    async fn query_maps_distances_to_similarity() {
        let server = MockServer::start().await;
        mount_collection(&server).await;

        let body = json!({
            "ids": [["a", "b"]],
            "documents": [["first doc", "second doc"]],
            "metadatas": [[{"source": "web"}, null]],
            "distances": [[0.2, 1.0]],
        });

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let store = ChromaStore::new(&server.uri()).unwrap();
        let matches = store.query("docs", &[0.1, 0.2], 2, None).await.unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert!((matches[0].similarity - 0.9).abs() < 1e-6);
        assert!((matches[1].similarity - 0.5).abs() < 1e-6);
        assert_eq!(matches[0].metadata.get("source").map(String::as_str), Some("web"));
        assert!(matches[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn upsert_error_surfaces_status() {
        let server = MockServer::start().await;
        mount_collection(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/upsert"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let store = ChromaStore::new(&server.uri()).unwrap();
        let err = store.upsert("docs", &[chunk("a")]).await.unwrap_err();
        assert!(err.to_string().contains("422"));
    }
}
