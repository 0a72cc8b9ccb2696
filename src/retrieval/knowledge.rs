//! Builds an in-memory index from a plain-text knowledge file. Paragraphs
//! (blank-line separated) become chunks. A line such as `[schema]` sets the
//! kind of every following paragraph until the next such line; paragraphs
//! before any header are general.

use super::embedder::Embedder;
use super::vector_store::{Document, InMemoryVectorIndex, GENERAL_KIND, KIND_KEY};
use crate::error::{InsightError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeChunk {
    pub kind: String,
    pub text: String,
}

/// `[business_events]` -> `business_events`.
fn section_header(line: &str) -> Option<String> {
    let name = line.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ') {
        return None;
    }
    Some(name.to_lowercase().replace(' ', "_"))
}

pub fn split_chunks(text: &str) -> Vec<KnowledgeChunk> {
    let mut kind = GENERAL_KIND.to_string();
    let mut chunks = Vec::new();
    for paragraph in text.split("\n\n") {
        let mut body = Vec::new();
        for line in paragraph.lines() {
            match section_header(line) {
                Some(header) if body.is_empty() => kind = header,
                _ => body.push(line),
            }
        }
        let body = body.join("\n");
        let body = body.trim();
        if !body.is_empty() {
            chunks.push(KnowledgeChunk {
                kind: kind.clone(),
                text: body.to_string(),
            });
        }
    }
    chunks
}

pub async fn index_text(text: &str, source: &str, embedder: &dyn Embedder) -> Result<InMemoryVectorIndex> {
    let mut index = InMemoryVectorIndex::new(embedder.dimension());
    for (i, chunk) in split_chunks(text).into_iter().enumerate() {
        let embedding = embedder
            .embed(&chunk.text)
            .await
            .map_err(|e| InsightError::Retrieval(e.to_string()))?;
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.to_string());
        metadata.insert(KIND_KEY.to_string(), chunk.kind);
        let added = index.add_document(Document {
            id: format!("{}#{}", source, i),
            text: chunk.text,
            metadata,
            embedding: Some(embedding),
        });
        if !added {
            warn!("Chunk {} of {} has an unexpected embedding size, skipped", i, source);
        }
    }
    info!("Indexed {} knowledge chunk(s) from {}", index.len(), source);
    Ok(index)
}

pub async fn index_file(path: &Path, embedder: &dyn Embedder) -> Result<InMemoryVectorIndex> {
    let text = std::fs::read_to_string(path)?;
    index_text(&text, &path.display().to_string(), embedder).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::embedder::HashingEmbedder;

    #[test]
    fn test_split_chunks() {
        let chunks = split_chunks("first para\nline two\n\n\n  second  \n\n");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first para\nline two", "second"]);
        assert!(chunks.iter().all(|c| c.kind == GENERAL_KIND));
    }

    #[test]
    fn test_section_headers_set_kind() {
        let text = "Intro.\n\n[schema]\nNet_Amount_BDT is sales.\n\nProfit_BDT is profit.\n\n[Business Events]\n\nPrice war in 2023.\n\n[not a header!]";
        let chunks = split_chunks(text);
        let kinds: Vec<&str> = chunks.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["general", "schema", "schema", "business_events", "business_events"]);
        assert_eq!(chunks[1].text, "Net_Amount_BDT is sales.");
        assert_eq!(chunks[4].text, "[not a header!]");
    }

    #[tokio::test]
    async fn test_index_text() {
        let embedder = HashingEmbedder::new(32);
        let index = index_text("Cement margins are thin.\n\nSteel sells in Q4.", "kb", &embedder)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
    }
}
