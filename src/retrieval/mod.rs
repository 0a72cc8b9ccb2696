//! Retrieval of grounding context

pub mod embedder;
pub mod knowledge;
pub mod retriever;
pub mod vector_store;

pub use embedder::{Embedder, HashingEmbedder, OpenAiEmbedder};
pub use retriever::{ContextRetriever, RetrievedContext};
pub use vector_store::{
    cosine_similarity, Document, Embedding, InMemoryVectorIndex, IndexError, ScoredChunk,
    VectorIndex, GENERAL_KIND, KIND_KEY,
};
