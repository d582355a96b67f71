//! Retrieval core for single-document question answering.
//!
//! This crate turns one uploaded document into a persisted similarity index
//! and answers questions against it:
//! - Text extraction from PDF and plain-text documents
//! - Deterministic sliding-window chunking with overlap
//! - Embedding providers (OpenAI, Ollama, deterministic mock)
//! - Exact cosine-similarity search over unit-normalized vectors
//! - Atomic, generation-based index persistence
//! - Bounded context-window assembly for a grounded answer generator
//!
//! # Architecture
//!
//! - **Extractor / Chunker**: document to ordered chunks
//! - **Embedding Providers**: text to vector, behind one trait
//! - **Vector Index**: immutable index for one generation
//! - **Index Store**: matched vector/metadata pair per generation on disk
//! - **Retrieval Engine**: build and query flows plus the in-memory cache
//!
//! # Example
//!
//! ```no_run
//! use docqa_rag::prelude::*;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RagConfig::default();
//! let engine = RetrievalEngine::from_config(&config)?;
//!
//! engine.build_from_path(Path::new("syllabus.pdf")).await?;
//!
//! let answer = engine.ask("When is the final exam?").await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod providers;
pub mod store;
pub mod types;

pub use chunker::{Chunker, Window, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{
    ChunkingConfig, EmbeddingConfig, GenerationConfig, RagConfig, RetrievalConfig, StoreConfig,
};
pub use context::{assemble_context, DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_SEPARATOR};
pub use engine::{BuildPhase, BuildReport, RetrievalEngine, RetrievedContext};
pub use error::{RagError, Result};
pub use extractor::{extract_bytes, extract_file, DocumentFormat};
pub use generation::{
    create_generator, AnswerGenerator, OllamaGenerator, OpenAIChatGenerator, NOT_FOUND_ANSWER,
};
pub use index::{VectorIndex, DEFAULT_TOP_K};
pub use providers::{create_provider, EmbeddingProvider, MockProvider, OllamaProvider, OpenAIProvider};
pub use store::{GenerationInfo, IndexGeneration, IndexStore};
pub use types::{Chunk, EmbeddingModel, ScoredChunk, Vector};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RagConfig;
    pub use crate::engine::{BuildReport, RetrievalEngine, RetrievedContext};
    pub use crate::error::{RagError, Result};
    pub use crate::generation::AnswerGenerator;
    pub use crate::providers::EmbeddingProvider;
    pub use crate::types::{Chunk, ScoredChunk, Vector};
}
