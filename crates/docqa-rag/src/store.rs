//! On-disk persistence for index generations.
//!
//! Layout under the data directory:
//!
//! ```text
//! CURRENT                      id of the live generation
//! generations/<id>/vectors.bin     bincode row-major f32 matrix
//! generations/<id>/metadata.json   ordered chunks + generation info
//! ```
//!
//! A generation directory is fully written under a staging name, renamed
//! into place, and only then published by replacing `CURRENT` through a
//! temp-file rename. Readers therefore see either the old pair or the new
//! pair, never a mix.

use crate::config::StoreConfig;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::types::{Chunk, EmbeddingModel};
use bincode::config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CURRENT_FILE: &str = "CURRENT";
const CURRENT_TMP_FILE: &str = "CURRENT.tmp";
const GENERATIONS_DIR: &str = "generations";
const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";
const STAGING_SUFFIX: &str = ".partial";

/// Descriptive metadata of one persisted generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Document the generation was built from.
    pub source: String,
    pub model: EmbeddingModel,
    pub dimension: usize,
    pub entry_count: usize,
}

/// A complete index generation: the index plus its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexGeneration {
    pub info: GenerationInfo,
    pub index: VectorIndex,
}

impl IndexGeneration {
    /// Wrap a freshly built index under a new generation id.
    pub fn new(index: VectorIndex, source: impl Into<String>, model: EmbeddingModel) -> Self {
        let info = GenerationInfo {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            source: source.into(),
            model,
            dimension: index.dimension(),
            entry_count: index.len(),
        };

        Self { info, index }
    }
}

#[derive(Serialize, Deserialize)]
struct VectorArtifact {
    generation_id: String,
    rows: usize,
    dimension: usize,
    values: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct MetadataArtifact {
    #[serde(flatten)]
    info: GenerationInfo,
    /// blake3 hex digest of `vectors.bin`.
    vectors_checksum: String,
    chunks: Vec<Chunk>,
}

/// Reads and writes index generations under one data directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    keep_generations: usize,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>, keep_generations: usize) -> Self {
        Self {
            dir: dir.into(),
            keep_generations: keep_generations.max(1),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.data_dir, config.keep_generations)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn generations_dir(&self) -> PathBuf {
        self.dir.join(GENERATIONS_DIR)
    }

    fn generation_dir(&self, id: &str) -> PathBuf {
        self.generations_dir().join(id)
    }

    /// Persist a generation and make it the current one.
    pub async fn save(&self, generation: &IndexGeneration) -> Result<()> {
        let id = &generation.info.id;
        let index = &generation.index;
        info!(generation = %id, entries = index.len(), "Saving index generation");

        let artifact = VectorArtifact {
            generation_id: id.clone(),
            rows: index.len(),
            dimension: index.dimension(),
            values: index.matrix().to_vec(),
        };
        let vectors = bincode::serde::encode_to_vec(&artifact, config::standard())
            .map_err(|e| RagError::serialization(format!("vector artifact: {}", e)))?;

        let metadata = MetadataArtifact {
            info: generation.info.clone(),
            vectors_checksum: blake3::hash(&vectors).to_hex().to_string(),
            chunks: index.chunks().to_vec(),
        };
        let metadata = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| RagError::serialization(format!("metadata artifact: {}", e)))?;

        let staging = self
            .generations_dir()
            .join(format!("{}{}", id, STAGING_SUFFIX));
        let final_dir = self.generation_dir(id);

        fs::create_dir_all(&staging).await?;
        fs::write(staging.join(VECTORS_FILE), &vectors).await?;
        fs::write(staging.join(METADATA_FILE), &metadata).await?;
        fs::rename(&staging, &final_dir).await?;

        let pointer_tmp = self.dir.join(CURRENT_TMP_FILE);
        fs::write(&pointer_tmp, format!("{}\n", id)).await?;
        fs::rename(&pointer_tmp, self.dir.join(CURRENT_FILE)).await?;

        info!(generation = %id, "Index generation is now current");

        self.prune(id).await;
        Ok(())
    }

    /// Load the current generation.
    ///
    /// Returns `Ok(None)` when nothing has ever been saved.
    pub async fn load(&self) -> Result<Option<IndexGeneration>> {
        let Some(id) = self.current_id().await? else {
            return Ok(None);
        };

        let dir = self.generation_dir(&id);
        let metadata = self.read_metadata(&id).await?;

        let vectors = read_optional(&dir.join(VECTORS_FILE))
            .await?
            .ok_or_else(|| RagError::corrupt(format!("generation {} has no vector artifact", id)))?;

        let checksum = blake3::hash(&vectors).to_hex().to_string();
        if checksum != metadata.vectors_checksum {
            return Err(RagError::corrupt(format!(
                "vector artifact checksum mismatch for generation {}",
                id
            )));
        }

        let (artifact, _): (VectorArtifact, usize) =
            bincode::serde::decode_from_slice(&vectors, config::standard())
                .map_err(|e| RagError::corrupt(format!("unreadable vector artifact: {}", e)))?;

        check_consistency(&id, &metadata, &artifact)?;

        let index = VectorIndex::from_parts(artifact.dimension, metadata.chunks, artifact.values)?;

        debug!(
            generation = %id,
            entries = index.len(),
            dimension = index.dimension(),
            "Index generation loaded from disk"
        );

        Ok(Some(IndexGeneration {
            info: metadata.info,
            index,
        }))
    }

    /// Metadata of the current generation, without reading the vectors.
    pub async fn status(&self) -> Result<Option<GenerationInfo>> {
        match self.current_id().await? {
            Some(id) => Ok(Some(self.read_metadata(&id).await?.info)),
            None => Ok(None),
        }
    }

    async fn current_id(&self) -> Result<Option<String>> {
        let Some(bytes) = read_optional(&self.dir.join(CURRENT_FILE)).await? else {
            return Ok(None);
        };

        let id = String::from_utf8_lossy(&bytes).trim().to_string();
        if id.is_empty() {
            return Err(RagError::corrupt("CURRENT pointer is empty"));
        }

        if !fs::try_exists(self.generation_dir(&id)).await? {
            return Err(RagError::corrupt(format!(
                "CURRENT points to missing generation {}",
                id
            )));
        }

        Ok(Some(id))
    }

    async fn read_metadata(&self, id: &str) -> Result<MetadataArtifact> {
        let bytes = read_optional(&self.generation_dir(id).join(METADATA_FILE))
            .await?
            .ok_or_else(|| RagError::corrupt(format!("generation {} has no metadata artifact", id)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| RagError::corrupt(format!("unreadable metadata artifact: {}", e)))
    }

    /// Remove all but the newest `keep_generations` generations. The current
    /// generation is always kept. Failures only log.
    async fn prune(&self, current: &str) {
        let mut entries = match fs::read_dir(self.generations_dir()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list generations for pruning: {}", e);
                return;
            }
        };

        let mut others: Vec<(DateTime<Utc>, PathBuf)> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == current {
                continue;
            }

            // Staging directories left behind by a crashed save.
            if name.ends_with(STAGING_SUFFIX) {
                others.push((DateTime::<Utc>::MIN_UTC, entry.path()));
                continue;
            }

            let created_at = self
                .read_metadata(&name)
                .await
                .map(|m| m.info.created_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            others.push((created_at, entry.path()));
        }

        others.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in others.into_iter().skip(self.keep_generations - 1) {
            match fs::remove_dir_all(&path).await {
                Ok(()) => debug!("Pruned old generation: {}", path.display()),
                Err(e) => warn!("Failed to prune {}: {}", path.display(), e),
            }
        }
    }
}

fn check_consistency(id: &str, metadata: &MetadataArtifact, artifact: &VectorArtifact) -> Result<()> {
    let info = &metadata.info;

    if info.id != id || artifact.generation_id != id {
        return Err(RagError::corrupt(format!(
            "generation id mismatch: pointer {}, metadata {}, vectors {}",
            id, info.id, artifact.generation_id
        )));
    }

    if artifact.rows != metadata.chunks.len() || info.entry_count != metadata.chunks.len() {
        return Err(RagError::corrupt(format!(
            "entry count mismatch: {} vectors, {} chunks, {} recorded",
            artifact.rows,
            metadata.chunks.len(),
            info.entry_count
        )));
    }

    if artifact.dimension != info.dimension {
        return Err(RagError::corrupt(format!(
            "dimension mismatch: vectors have {}, metadata records {}",
            artifact.dimension, info.dimension
        )));
    }

    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
