//! Vector index abstraction
//!
//! The index itself is an external collaborator; [`InMemoryVectorIndex`] is
//! the brute-force cosine implementation used by the CLI and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// Metadata key holding a document's kind ("schema", "products", ...).
pub const KIND_KEY: &str = "type";
/// Kind of a document indexed without one.
pub const GENERAL_KIND: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    #[serde(skip)]
    pub embedding: Option<Embedding>,
}

impl Document {
    pub fn kind(&self) -> &str {
        self.metadata.get(KIND_KEY).map(String::as_str).unwrap_or(GENERAL_KIND)
    }
}

/// A chunk returned by the index with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    #[serde(default = "general_kind")]
    pub kind: String,
    pub score: f32,
}

fn general_kind() -> String {
    GENERAL_KIND.to_string()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("index unreachable: {0}")]
    Unreachable(String),
    #[error("embedding dimension {got} doesn't match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("embedding failed: {0}")]
    Embedding(String),
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn nearest_neighbors(&self, embedding: &Embedding, k: usize)
        -> Result<Vec<ScoredChunk>, IndexError>;

    /// Nearest chunks of one kind. The default over-fetches from
    /// [`nearest_neighbors`](Self::nearest_neighbors) and filters.
    async fn nearest_of_kind(
        &self,
        embedding: &Embedding,
        kind: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let mut chunks = self.nearest_neighbors(embedding, k.saturating_mul(3)).await?;
        chunks.retain(|c| c.kind == kind);
        chunks.truncate(k);
        Ok(chunks)
    }

    async fn health_check(&self) -> bool;
}

pub struct InMemoryVectorIndex {
    documents: Vec<Document>,
    dimension: usize,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            documents: Vec::new(),
            dimension,
        }
    }

    /// Add a document; returns false when its embedding is missing or has
    /// the wrong dimension, in which case it is not searchable.
    pub fn add_document(&mut self, document: Document) -> bool {
        match &document.embedding {
            Some(embedding) if embedding.len() == self.dimension => {
                self.documents.push(document);
                true
            }
            _ => false,
        }
    }

    pub fn add_documents(&mut self, documents: Vec<Document>) -> usize {
        documents
            .into_iter()
            .map(|d| self.add_document(d))
            .filter(|added| *added)
            .count()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl InMemoryVectorIndex {
    fn rank(
        &self,
        embedding: &Embedding,
        k: usize,
        kind: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: embedding.len(),
            });
        }

        let mut results: Vec<ScoredChunk> = self
            .documents
            .iter()
            .filter(|doc| kind.map_or(true, |wanted| doc.kind() == wanted))
            .filter_map(|doc| {
                doc.embedding.as_ref().map(|e| ScoredChunk {
                    id: doc.id.clone(),
                    text: doc.text.clone(),
                    kind: doc.kind().to_string(),
                    score: cosine_similarity(embedding, e),
                })
            })
            .collect();

        // Ties broken by id so equal scores come back in a stable order.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);
        Ok(results)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn nearest_neighbors(
        &self,
        embedding: &Embedding,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.rank(embedding, k, None)
    }

    async fn nearest_of_kind(
        &self,
        embedding: &Embedding,
        kind: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.rank(embedding, k, Some(kind))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: id.to_string(),
            text: format!("text of {}", id),
            metadata: HashMap::new(),
            embedding: Some(embedding),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let mut index = InMemoryVectorIndex::new(3);
        assert!(!index.add_document(doc("short", vec![1.0])));
        assert!(index.add_document(doc("ok", vec![1.0, 0.0, 0.0])));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_sorted_and_capped() {
        let mut index = InMemoryVectorIndex::new(2);
        index.add_documents(vec![
            doc("a", vec![1.0, 0.0]),
            doc("b", vec![0.7, 0.7]),
            doc("c", vec![0.0, 1.0]),
        ]);

        let results = index.nearest_neighbors(&vec![1.0, 0.1], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_nearest_of_kind_reads_metadata() {
        let mut schema = doc("schema", vec![0.0, 1.0]);
        schema.metadata.insert(KIND_KEY.to_string(), "schema".to_string());
        let mut index = InMemoryVectorIndex::new(2);
        index.add_documents(vec![doc("a", vec![1.0, 0.0]), schema]);

        let all = index.nearest_neighbors(&vec![1.0, 0.0], 5).await.unwrap();
        assert_eq!(all[0].kind, GENERAL_KIND);

        let typed = index.nearest_of_kind(&vec![1.0, 0.0], "schema", 5).await.unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].id, "schema");
        assert_eq!(typed[0].kind, "schema");
        assert!(index.nearest_of_kind(&vec![1.0, 0.0], "products", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = InMemoryVectorIndex::new(2);
        assert!(index.nearest_neighbors(&vec![1.0, 0.0], 5).await.unwrap().is_empty());
    }
}
