//! Retrieval orchestrator: the build and query flows over one document.
//!
//! The engine owns the in-memory cache of the current generation. A build
//! persists its generation first and then swaps the cache under the write
//! lock, so a concurrent query sees either the previous generation or the
//! new one in full. Builds are serialised; queries keep being served from
//! the last persisted generation while a build runs.

use crate::chunker::Chunker;
use crate::config::{RagConfig, RetrievalConfig};
use crate::context::assemble_context;
use crate::error::{RagError, Result};
use crate::extractor::extract_file;
use crate::generation::{create_generator, AnswerGenerator};
use crate::index::VectorIndex;
use crate::providers::{create_provider, EmbeddingProvider};
use crate::store::{GenerationInfo, IndexGeneration, IndexStore};
use crate::types::{Chunk, EmbeddingModel, ScoredChunk, Vector};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Progress of the most recent build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum BuildPhase {
    Idle,
    Extracting,
    Chunking,
    Embedding { completed: usize, total: usize },
    Indexing,
    Persisted,
    Failed { stage: &'static str },
}

/// Summary of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generation_id: String,
    pub source: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub model: EmbeddingModel,
    pub elapsed_ms: u64,
}

/// Ranked hits and the context window assembled from them.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub generation_id: String,
    pub context: String,
    pub hits: Vec<ScoredChunk>,
}

pub struct RetrievalEngine {
    chunker: Chunker,
    retrieval: RetrievalConfig,
    max_concurrency: usize,
    provider: Arc<dyn EmbeddingProvider>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    store: IndexStore,
    cache: RwLock<Option<Arc<IndexGeneration>>>,
    build_lock: Mutex<()>,
    phase: parking_lot::RwLock<BuildPhase>,
}

impl RetrievalEngine {
    /// Create an engine from explicit collaborators.
    pub fn new(
        config: &RagConfig,
        provider: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn AnswerGenerator>>,
        store: IndexStore,
    ) -> Result<Self> {
        let chunker = Chunker::from_config(&config.chunking)?;

        Ok(Self {
            chunker,
            retrieval: config.retrieval.clone(),
            max_concurrency: config.embedding.max_concurrency.max(1),
            provider,
            generator,
            store,
            cache: RwLock::new(None),
            build_lock: Mutex::new(()),
            phase: parking_lot::RwLock::new(BuildPhase::Idle),
        })
    }

    /// Create an engine with the providers and store named in the config.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let provider = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let store = IndexStore::from_config(&config.store);

        Self::new(config, provider, generator, store)
    }

    pub fn build_phase(&self) -> BuildPhase {
        self.phase.read().clone()
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    fn set_phase(&self, phase: BuildPhase) {
        *self.phase.write() = phase;
    }

    fn mark_failed(&self, err: &RagError) {
        error!(stage = err.stage(), "Build failed: {}", err);
        self.set_phase(BuildPhase::Failed { stage: err.stage() });
    }

    /// Build a new generation from a document on disk.
    pub async fn build_from_path(&self, path: &Path) -> Result<BuildReport> {
        let _build = self.build_lock.lock().await;
        let started = Instant::now();
        info!(path = %path.display(), "Starting index build");

        self.set_phase(BuildPhase::Extracting);
        let text = extract_file(path)
            .await
            .inspect_err(|e| self.mark_failed(e))?;

        self.build_locked(&text, path.display().to_string(), started)
            .await
            .inspect_err(|e| self.mark_failed(e))
    }

    /// Build a new generation from already extracted text.
    pub async fn build_from_text(&self, text: &str, source: &str) -> Result<BuildReport> {
        let _build = self.build_lock.lock().await;
        let started = Instant::now();
        info!(source, "Starting index build from text");

        self.build_locked(text, source.to_string(), started)
            .await
            .inspect_err(|e| self.mark_failed(e))
    }

    async fn build_locked(&self, text: &str, source: String, started: Instant) -> Result<BuildReport> {
        self.set_phase(BuildPhase::Chunking);
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Err(RagError::extraction("document contains no text to index"));
        }
        debug!(
            chunks = chunks.len(),
            chunk_size = self.chunker.chunk_size(),
            overlap = self.chunker.overlap(),
            "Document chunked"
        );

        let vectors = self.embed_chunks(&chunks).await?;

        self.set_phase(BuildPhase::Indexing);
        let index = VectorIndex::build(chunks.into_iter().zip(vectors).collect())?;
        let generation = IndexGeneration::new(index, source, self.provider.model().clone());

        self.store.save(&generation).await?;

        let generation = Arc::new(generation);
        *self.cache.write().await = Some(Arc::clone(&generation));
        self.set_phase(BuildPhase::Persisted);

        let report = BuildReport {
            generation_id: generation.info.id.clone(),
            source: generation.info.source.clone(),
            chunk_count: generation.index.len(),
            dimension: generation.index.dimension(),
            model: generation.info.model.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            generation = %report.generation_id,
            chunks = report.chunk_count,
            dimension = report.dimension,
            latency_ms = report.elapsed_ms,
            "Index build complete, cache swapped"
        );

        Ok(report)
    }

    /// Embed every chunk with bounded parallelism, returning vectors in
    /// chunk order. The first failure cancels the remaining calls.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vector>> {
        let total = chunks.len();
        self.set_phase(BuildPhase::Embedding { completed: 0, total });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (position, chunk) in chunks.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let ordinal = chunk.ordinal;
            let text = chunk.text.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RagError::embedding(e.to_string()).at_ordinal(ordinal))?;

                let vector = provider
                    .embed(&text)
                    .await
                    .map_err(|e| e.at_ordinal(ordinal))?;

                Ok::<_, RagError>((position, vector))
            });
        }

        let mut vectors: Vec<Option<Vector>> = vec![None; total];
        let mut completed = 0;

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| RagError::embedding(format!("embedding task failed: {}", e)))
                .and_then(|result| result);

            match outcome {
                Ok((position, vector)) => {
                    vectors[position] = Some(vector);
                    completed += 1;
                    debug!(completed, total, "Chunk embedded");
                    self.set_phase(BuildPhase::Embedding { completed, total });
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(position, vector)| {
                vector.ok_or_else(|| {
                    RagError::embedding("embedding result missing").at_ordinal(chunks[position].ordinal)
                })
            })
            .collect()
    }

    /// Embed the question, search the current generation and assemble the
    /// context window. No generation call is made.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext> {
        let started = Instant::now();
        let generation = self.ensure_loaded().await?;

        let query = self.provider.embed(question).await?;
        let hits = generation.index.search(&query, self.retrieval.top_k)?;
        let context = assemble_context(
            &hits,
            &self.retrieval.separator,
            self.retrieval.max_context_chars,
        );

        info!(
            generation = %generation.info.id,
            hits = hits.len(),
            context_chars = context.chars().count(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Context assembled"
        );

        Ok(RetrievedContext {
            generation_id: generation.info.id.clone(),
            context,
            hits,
        })
    }

    /// Answer a question from the current generation.
    ///
    /// The generator's answer is returned unchanged.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let started = Instant::now();
        let retrieved = self.retrieve(question).await?;

        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| RagError::generation("no generation provider configured"))?;
        let answer = generator.generate(&retrieved.context, question).await?;

        info!(
            generation = %retrieved.generation_id,
            model = generator.model_name(),
            answer_chars = answer.chars().count(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Question answered"
        );

        Ok(answer)
    }

    /// Replace the cached generation with the current one from the store.
    ///
    /// A failed load leaves the cache untouched.
    pub async fn reload(&self) -> Result<Option<GenerationInfo>> {
        let mut cache = self.cache.write().await;

        let loaded = self.store.load().await?.map(Arc::new);
        let info = loaded.as_ref().map(|g| g.info.clone());
        *cache = loaded;

        info!(loaded = info.is_some(), "Index cache reloaded");
        Ok(info)
    }

    /// Info of the generation queries are served from.
    pub async fn current_generation(&self) -> Result<Option<GenerationInfo>> {
        if let Some(generation) = self.cache.read().await.as_ref() {
            return Ok(Some(generation.info.clone()));
        }
        self.store.status().await
    }

    async fn ensure_loaded(&self) -> Result<Arc<IndexGeneration>> {
        if let Some(generation) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(generation));
        }

        // Loading under the write lock keeps a stale load from overwriting a
        // generation swapped in by a build that finished meanwhile.
        let mut cache = self.cache.write().await;
        if let Some(generation) = cache.as_ref() {
            return Ok(Arc::clone(generation));
        }

        let generation = self
            .store
            .load()
            .await?
            .ok_or(RagError::NoIndexAvailable)?;

        if generation.info.model.model_name != self.provider.model().model_name {
            warn!(
                persisted = %generation.info.model.model_name,
                configured = %self.provider.model().model_name,
                "Index was built with a different embedding model"
            );
        }

        info!(
            generation = %generation.info.id,
            entries = generation.index.len(),
            "Index loaded into cache"
        );

        let generation = Arc::new(generation);
        *cache = Some(Arc::clone(&generation));
        Ok(generation)
    }
}
