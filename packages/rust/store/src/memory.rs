//! In-memory vector store for tests and offline runs.

use std::collections::HashMap;

use tokio::sync::Mutex;

use ragforge_shared::{RagForgeError, Result};

use crate::{MetadataFilter, QueryMatch, StoredChunk, VectorStore, distance_to_similarity};

/// Brute-force cosine store. Collections are plain maps; queries scan
/// everything. Fine for tests, not for production corpora.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, StoredChunk>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total chunks in a collection (test helper).
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.collections
            .lock()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[StoredChunk]) -> Result<usize> {
        let mut collections = self.collections.lock().await;
        let entries = collections.entry(collection.to_string()).or_default();
        for chunk in chunks {
            entries.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(crate::upsert_batches(chunks).count())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let collections = self.collections.lock().await;
        let entries = collections
            .get(collection)
            .ok_or_else(|| RagForgeError::Store(format!("no such collection: {collection}")))?;

        let mut matches: Vec<QueryMatch> = entries
            .values()
            .filter(|chunk| {
                filter.is_none_or(|f| {
                    f.iter()
                        .all(|(k, v)| chunk.metadata.get(k).is_some_and(|m| m == v))
                })
            })
            .map(|chunk| {
                let distance = cosine_distance(embedding, &chunk.embedding);
                QueryMatch {
                    id: chunk.id.clone(),
                    document: chunk.document.clone(),
                    metadata: chunk.metadata.clone(),
                    distance,
                    similarity: distance_to_similarity(distance),
                }
            })
            .collect();

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().await.remove(name);
        Ok(())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        // Zero vectors (the embedding sentinel) are maximally distant.
        return 2.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn chunk(id: &str, embedding: Vec<f32>, source: &str) -> StoredChunk {
        StoredChunk {
            id: id.to_string(),
            document: format!("doc {id}"),
            embedding,
            metadata: BTreeMap::from([("source".to_string(), source.to_string())]),
        }
    }

    #[tokio::test]
    async fn query_orders_by_similarity() {
        let store = MemoryStore::new();
        store
            .upsert(
                "docs",
                &[
                    chunk("far", vec![-1.0, 0.0], "a"),
                    chunk("near", vec![1.0, 0.0], "a"),
                    chunk("mid", vec![0.0, 1.0], "a"),
                ],
            )
            .await
            .unwrap();

        let matches = store.query("docs", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "near");
        assert!((matches[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(matches[1].id, "mid");
    }

    #[tokio::test]
    async fn metadata_filter_is_exact_match() {
        let store = MemoryStore::new();
        store
            .upsert(
                "docs",
                &[
                    chunk("w", vec![1.0, 0.0], "web"),
                    chunk("r", vec![1.0, 0.0], "repo"),
                ],
            )
            .await
            .unwrap();

        let filter = BTreeMap::from([("source".to_string(), "repo".to_string())]);
        let matches = store
            .query("docs", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "r");
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let store = MemoryStore::new();
        store
            .upsert("docs", &[chunk("a", vec![1.0], "x")])
            .await
            .unwrap();
        store
            .upsert("docs", &[chunk("a", vec![0.5], "y")])
            .await
            .unwrap();

        assert_eq!(store.len("docs").await, 1);
        let matches = store.query("docs", &[1.0], 1, None).await.unwrap();
        assert_eq!(matches[0].metadata.get("source").map(String::as_str), Some("y"));
    }

    #[tokio::test]
    async fn zero_vector_sentinel_ranks_last() {
        let store = MemoryStore::new();
        store
            .upsert(
                "docs",
                &[
                    chunk("zero", vec![0.0, 0.0], "a"),
                    chunk("real", vec![0.7, 0.7], "a"),
                ],
            )
            .await
            .unwrap();

        let matches = store.query("docs", &[1.0, 1.0], 2, None).await.unwrap();
        assert_eq!(matches[0].id, "real");
        assert_eq!(matches[1].similarity, 0.0);
    }
}
