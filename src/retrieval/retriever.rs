//! Context Retriever
//!
//! Fetches grounding chunks for a query, optionally restricted to a list of
//! knowledge kinds. Retrieval never fails the request: every problem below
//! this layer is logged and turned into an empty context.

use super::embedder::Embedder;
use super::vector_store::{IndexError, ScoredChunk, VectorIndex};
use crate::config::RetrievalConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Chunks ordered by non-increasing score, at most `k` of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    chunks: Vec<ScoredChunk>,
}

impl RetrievedContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[ScoredChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks grouped by kind, groups in order of their best chunk.
    pub fn sections(&self) -> Vec<(&str, Vec<&ScoredChunk>)> {
        let mut sections: Vec<(&str, Vec<&ScoredChunk>)> = Vec::new();
        for chunk in &self.chunks {
            match sections.iter_mut().find(|(kind, _)| *kind == chunk.kind) {
                Some((_, members)) => members.push(chunk),
                None => sections.push((chunk.kind.as_str(), vec![chunk])),
            }
        }
        sections
    }

    /// Chunks for a prompt under `=== KIND ===` headers, numbered within each
    /// section and cut at `max_chars` characters.
    pub fn render(&self, max_chars: usize) -> String {
        let mut out = String::new();
        let mut budget = max_chars;
        for (kind, chunks) in self.sections() {
            let header = format!("=== {} ===\n", kind.to_uppercase().replace('_', " "));
            if !push_within(&mut out, &mut budget, &header) {
                return out;
            }
            for (i, chunk) in chunks.iter().enumerate() {
                let entry = format!("[{}] {}\n", i + 1, chunk.text.trim());
                if !push_within(&mut out, &mut budget, &entry) {
                    return out;
                }
            }
        }
        out
    }
}

/// Append as much of `piece` as `budget` characters allow. False once the
/// budget ran out.
fn push_within(out: &mut String, budget: &mut usize, piece: &str) -> bool {
    let len = piece.chars().count();
    if len <= *budget {
        out.push_str(piece);
        *budget -= len;
        true
    } else {
        out.extend(piece.chars().take(*budget));
        *budget = 0;
        false
    }
}

pub struct ContextRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl ContextRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self {
            index,
            embedder,
            timeout,
        }
    }

    pub fn from_config(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
    ) -> Self {
        Self::new(index, embedder, config.timeout)
    }

    pub async fn retrieve(&self, query: &str, k: usize, min_score: f32) -> RetrievedContext {
        self.retrieve_kinds(query, &[], k, min_score).await
    }

    /// Up to `k` chunks drawn from the listed kinds. With no kinds, or when
    /// none of them has a matching chunk, this is a plain search over the
    /// whole index.
    pub async fn retrieve_kinds(&self, query: &str, kinds: &[&str], k: usize, min_score: f32) -> RetrievedContext {
        if k == 0 {
            return RetrievedContext::empty();
        }

        let lookup = async {
            let embedding = self.embedder.embed(query).await?;
            let mut typed = Vec::new();
            for kind in kinds {
                typed.extend(self.index.nearest_of_kind(&embedding, kind, k).await?);
            }
            if typed.iter().any(|c| c.score >= min_score) {
                return Ok::<_, IndexError>(typed);
            }
            if !kinds.is_empty() {
                debug!(kinds = ?kinds, "no typed context, falling back to general search");
            }
            self.index.nearest_neighbors(&embedding, k).await
        };

        let raw = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(err)) => {
                warn!(error = %err, "retrieval degraded, continuing without context");
                return RetrievedContext::empty();
            }
            Err(_) => {
                let err = IndexError::Unreachable(format!("no answer within {:?}", self.timeout));
                warn!(error = %err, "retrieval degraded, continuing without context");
                return RetrievedContext::empty();
            }
        };

        let context = bound(raw, k, min_score);
        debug!(chunks = context.len(), sections = context.sections().len(), "context retrieved");
        context
    }

    pub async fn health_check(&self) -> bool {
        self.index.health_check().await
    }
}

/// Enforce the floor, the ordering and the cap regardless of what the index
/// returned.
fn bound(mut chunks: Vec<ScoredChunk>, k: usize, min_score: f32) -> RetrievedContext {
    chunks.retain(|c| c.score.is_finite() && c.score >= min_score);
    chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    chunks.truncate(k);
    RetrievedContext { chunks }
}
