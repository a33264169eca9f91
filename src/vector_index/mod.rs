//! Vector Index Adapter (component C): local embeddings and cosine
//! similarity over the Behavior.md/State.md chunks, as an in-process index
//! that snapshots its state to disk rather than depending on an external
//! vector database.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ImpulseError, Result, ResultExt};
use crate::memory::chunker::Chunk;

/// A single retrieved hit, ranked by cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub file: String,
    pub section: String,
    pub score: f32,
}

/// Abstraction the Memory Store retrieves through, so the Reasoner's
/// pipeline and its tests don't depend on a real embedding model being
/// loadable in-process.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Rebuild the index from a full set of `(file_name, content)` pairs.
    async fn reindex(&self, files: &[(String, String)]) -> Result<()>;

    /// Replace the chunks belonging to `file_name` with `content`'s current
    /// chunking, leaving every other file's chunks untouched.
    async fn upsert_file(&self, file_name: &str, content: &str) -> Result<()>;

    /// Return the top `n_results` chunks belonging to one of `files`,
    /// ranked by similarity to `query`.
    async fn search(&self, query: &str, n_results: usize, files: &[&str]) -> Result<Vec<SearchHit>>;

    fn is_empty(&self) -> bool;

    /// Total chunk count across all files, surfaced on the health endpoint.
    fn chunk_count(&self) -> usize;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    chunks: Vec<IndexedChunk>,
}

/// Flat (no ANN structure) cosine-similarity index, adequate for the
/// thousands-of-chunks scale of a single user's memory files. Persists to
/// `<persist_dir>/chunks.json` so restarts don't require re-embedding.
pub struct FlatCosineIndex {
    persist_dir: PathBuf,
    model: RwLock<TextEmbedding>,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl FlatCosineIndex {
    pub fn new(persist_dir: impl Into<PathBuf>) -> Result<Self> {
        let persist_dir = persist_dir.into();
        std::fs::create_dir_all(&persist_dir)
            .context(format!("creating vector index dir {}", persist_dir.display()))?;

        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(false),
        )
        .map_err(|e| ImpulseError::other(format!("failed to load embedding model: {e}")))?;

        let chunks = load_snapshot(&persist_dir).unwrap_or_default();

        Ok(Self {
            persist_dir,
            model: RwLock::new(model),
            chunks: RwLock::new(chunks),
        })
    }

    fn snapshot_path(&self) -> PathBuf {
        self.persist_dir.join("chunks.json")
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .write()
            .map_err(|_| ImpulseError::other("embedding model lock poisoned"))?;
        let mut vecs = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| ImpulseError::other(format!("embedding failed: {e}")))?;
        vecs.pop()
            .ok_or_else(|| ImpulseError::other("embedding model returned no vectors"))
    }

    fn persist(&self) -> Result<()> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| ImpulseError::other("index lock poisoned"))?;
        let snapshot = Snapshot {
            chunks: chunks.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(self.snapshot_path(), json).context("persisting vector index snapshot")
    }
}

#[async_trait]
impl VectorIndex for FlatCosineIndex {
    async fn reindex(&self, files: &[(String, String)]) -> Result<()> {
        let mut embedded = Vec::new();
        for (file_name, content) in files {
            for chunk in crate::memory::chunker::chunk_markdown(content, file_name) {
                let embedding = self.embed_one(&chunk.content)?;
                embedded.push(IndexedChunk { chunk, embedding });
            }
        }
        let count = embedded.len();
        {
            let mut chunks = self
                .chunks
                .write()
                .map_err(|_| ImpulseError::other("index lock poisoned"))?;
            *chunks = embedded;
        }
        self.persist()?;
        info!(chunks = count, "reindexed vector index");
        Ok(())
    }

    async fn upsert_file(&self, file_name: &str, content: &str) -> Result<()> {
        let mut embedded = Vec::new();
        for chunk in crate::memory::chunker::chunk_markdown(content, file_name) {
            let embedding = self.embed_one(&chunk.content)?;
            embedded.push(IndexedChunk { chunk, embedding });
        }
        let count = embedded.len();
        {
            let mut chunks = self
                .chunks
                .write()
                .map_err(|_| ImpulseError::other("index lock poisoned"))?;
            chunks.retain(|c| c.chunk.file != file_name);
            chunks.extend(embedded);
        }
        self.persist()?;
        info!(file = file_name, chunks = count, "upserted file into vector index");
        Ok(())
    }

    async fn search(&self, query: &str, n_results: usize, files: &[&str]) -> Result<Vec<SearchHit>> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| ImpulseError::other("index lock poisoned"))?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_one(query)?;

        let mut scored: Vec<SearchHit> = chunks
            .iter()
            .filter(|c| files.contains(&c.chunk.file.as_str()))
            .map(|c| SearchHit {
                content: c.chunk.content.clone(),
                file: c.chunk.file.clone(),
                section: c.chunk.section.clone(),
                score: cosine_similarity(&query_embedding, &c.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);
        Ok(scored)
    }

    fn is_empty(&self) -> bool {
        self.chunks.read().map(|c| c.is_empty()).unwrap_or(true)
    }

    fn chunk_count(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }
}

fn load_snapshot(persist_dir: &Path) -> Option<Vec<IndexedChunk>> {
    let path = persist_dir.join("chunks.json");
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Snapshot>(&data) {
        Ok(snapshot) => Some(snapshot.chunks),
        Err(e) => {
            warn!(error = %e, "could not parse vector index snapshot, starting empty");
            None
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-memory stand-in used by tests and by the Reasoner's offline/degraded
/// paths, storing raw chunks without an embedding model so unit tests don't
/// need model weights on disk.
pub struct InMemoryIndex {
    chunks: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn reindex(&self, files: &[(String, String)]) -> Result<()> {
        let mut map = HashMap::new();
        for (file_name, content) in files {
            map.insert(
                file_name.clone(),
                crate::memory::chunker::chunk_markdown(content, file_name),
            );
        }
        *self.chunks.write().map_err(|_| ImpulseError::other("index lock poisoned"))? = map;
        Ok(())
    }

    async fn upsert_file(&self, file_name: &str, content: &str) -> Result<()> {
        let chunks = crate::memory::chunker::chunk_markdown(content, file_name);
        self.chunks
            .write()
            .map_err(|_| ImpulseError::other("index lock poisoned"))?
            .insert(file_name.to_string(), chunks);
        Ok(())
    }

    async fn search(&self, query: &str, n_results: usize, files: &[&str]) -> Result<Vec<SearchHit>> {
        let map = self
            .chunks
            .read()
            .map_err(|_| ImpulseError::other("index lock poisoned"))?;
        let query_lower = query.to_lowercase();
        let mut hits: Vec<SearchHit> = Vec::new();
        for file in files {
            if let Some(chunks) = map.get(*file) {
                for chunk in chunks {
                    let overlap = keyword_overlap(&query_lower, &chunk.content.to_lowercase());
                    hits.push(SearchHit {
                        content: chunk.content.clone(),
                        file: chunk.file.clone(),
                        section: chunk.section.clone(),
                        score: overlap,
                    });
                }
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        Ok(hits)
    }

    fn is_empty(&self) -> bool {
        self.chunks
            .read()
            .map(|m| m.values().all(|v| v.is_empty()))
            .unwrap_or(true)
    }

    fn chunk_count(&self) -> usize {
        self.chunks
            .read()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

fn keyword_overlap(query: &str, content: &str) -> f32 {
    let query_words: std::collections::HashSet<&str> = query.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let hits = query_words
        .iter()
        .filter(|w| content.contains(*w))
        .count();
    hits as f32 / query_words.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_index_ranks_by_overlap() {
        let index = InMemoryIndex::new();
        let files = vec![
            (
                "Behavior.md".to_string(),
                "# Observed Behaviors\n- buys shoes late at night on sale sites\n".to_string(),
            ),
            (
                "State.md".to_string(),
                "# Financial Snapshot\n- checking account steady\n".to_string(),
            ),
        ];
        index.reindex(&files).await.unwrap();
        let hits = index
            .search("late night shoes sale", 3, &["Behavior.md", "State.md"])
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].file, "Behavior.md");
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() {
        let index = InMemoryIndex::new();
        let hits = index.search("anything", 3, &["Behavior.md"]).await.unwrap();
        assert!(hits.is_empty());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_only_named_file() {
        let index = InMemoryIndex::new();
        index
            .reindex(&[
                ("Behavior.md".to_string(), "# B\n- old\n".to_string()),
                ("State.md".to_string(), "# S\n- keep\n".to_string()),
            ])
            .await
            .unwrap();
        index
            .upsert_file("Behavior.md", "# B\n- new\n")
            .await
            .unwrap();
        let hits = index
            .search("keep", 5, &["State.md"])
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.content.contains("keep")));
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
