//! Memory Store (component B): the four Markdown files that hold a user's
//! goals, budget, financial state, and observed behavior, plus the
//! query-aware retrieval strategy the Reasoner depends on.

pub mod chunker;
pub mod templates;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ImpulseError, Result, ResultExt};
use crate::vector_index::VectorIndex;

/// A single piece of retrieved context, tagged with its provenance.
#[derive(Debug, Clone)]
pub struct ContextSnippet {
    pub content: String,
    pub file: String,
    pub section: String,
    pub source: SnippetSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetSource {
    DirectRead,
    SimilaritySearch,
    FallbackRead,
}

/// Files always read in full regardless of query: goal and budget context
/// is cheap and load-bearing for every decision.
const CRITICAL_FILES: [&str; 2] = ["Goals.md", "Budget.md"];

/// Files searched via the vector index rather than read whole.
const SEARCHED_FILES: [&str; 2] = ["Behavior.md", "State.md"];

/// Filesystem-backed accessor for the four memory files under `memory_dir`.
pub struct MemoryStore {
    memory_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(memory_dir: impl Into<PathBuf>) -> Self {
        Self {
            memory_dir: memory_dir.into(),
        }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.memory_dir.join(file_name)
    }

    /// Create `memory_dir` and any missing memory file from its template.
    /// Idempotent: existing files are left untouched.
    pub fn ensure_initialized(&self) -> Result<()> {
        std::fs::create_dir_all(&self.memory_dir)
            .context(format!("creating memory dir {}", self.memory_dir.display()))?;

        for file_name in templates::MEMORY_FILES {
            let path = self.path_for(file_name);
            if !path.exists() {
                let content = templates::default_content(file_name).unwrap_or_default();
                std::fs::write(&path, content)
                    .context(format!("writing default {file_name}"))?;
                info!(file = file_name, "initialized memory file from template");
            }
        }
        Ok(())
    }

    pub fn read_file(&self, file_name: &str) -> Result<String> {
        let path = self.path_for(file_name);
        std::fs::read_to_string(&path)
            .map_err(|_| ImpulseError::MemoryFileMissing(path))
    }

    pub fn write_file(&self, file_name: &str, content: &str) -> Result<()> {
        let path = self.path_for(file_name);
        std::fs::write(&path, content).context(format!("writing {file_name}"))
    }

    /// Full content of every memory file, in canonical order, for reindexing
    /// the vector index from scratch (component C's `reindex`).
    pub fn read_all(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::with_capacity(templates::MEMORY_FILES.len());
        for file_name in templates::MEMORY_FILES {
            let path = self.path_for(file_name);
            if path.exists() {
                out.push((file_name.to_string(), self.read_file(file_name)?));
            }
        }
        Ok(out)
    }

    /// Retrieve context for a query: Goals.md and Budget.md always read in
    /// full, Behavior.md and State.md chunks surfaced by similarity search
    /// against `index` (falling back to a full read if the index is empty
    /// or errors).
    pub async fn retrieve_context(
        &self,
        query: &str,
        index: &dyn VectorIndex,
        n_results: usize,
    ) -> Vec<ContextSnippet> {
        let mut snippets = Vec::new();

        for file_name in CRITICAL_FILES {
            match self.read_file(file_name) {
                Ok(content) if !content.trim().is_empty() => {
                    snippets.push(ContextSnippet {
                        content: content.trim().to_string(),
                        file: file_name.to_string(),
                        section: "FULL FILE".to_string(),
                        source: SnippetSource::DirectRead,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(file = file_name, error = %e, "could not read critical memory file"),
            }
        }

        match index
            .search(query, n_results, &SEARCHED_FILES)
            .await
        {
            Ok(hits) if !hits.is_empty() => {
                for hit in hits {
                    snippets.push(ContextSnippet {
                        content: hit.content,
                        file: hit.file,
                        section: hit.section,
                        source: SnippetSource::SimilaritySearch,
                    });
                }
            }
            Ok(_) => {
                self.fallback_read(&mut snippets);
            }
            Err(e) => {
                warn!(error = %e, "similarity search failed, falling back to full reads");
                self.fallback_read(&mut snippets);
            }
        }

        info!(count = snippets.len(), "retrieved memory context");
        snippets
    }

    fn fallback_read(&self, snippets: &mut Vec<ContextSnippet>) {
        for file_name in SEARCHED_FILES {
            if let Ok(content) = self.read_file(file_name) {
                if !content.trim().is_empty() {
                    snippets.push(ContextSnippet {
                        content: content.trim().to_string(),
                        file: file_name.to_string(),
                        section: "FULL FILE".to_string(),
                        source: SnippetSource::FallbackRead,
                    });
                }
            }
        }
    }
}

/// Route a memory update to the file it belongs in, by keyword match:
/// goals, then budget, then state, defaulting to behavior. First match
/// wins.
pub fn determine_target_file(memory_update: &str) -> &'static str {
    let lower = memory_update.to_lowercase();

    const GOAL_KEYWORDS: [&str; 7] = [
        "goal",
        "objective",
        "plan",
        "aspiration",
        "saving for",
        "want to",
        "aim to",
    ];
    if GOAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return "Goals.md";
    }

    const BUDGET_KEYWORDS: [&str; 6] = [
        "budget",
        "limit",
        "allowance",
        "exceeded",
        "over budget",
        "monthly limit",
    ];
    if BUDGET_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return "Budget.md";
    }

    const STATE_KEYWORDS: [&str; 6] = [
        "balance",
        "account",
        "income",
        "savings",
        "wealth",
        "net worth",
    ];
    if STATE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return "State.md";
    }

    "Behavior.md"
}

/// Count non-placeholder bullet-point observations in a memory file's
/// content, used to decide between simple append and LLM-assisted
/// refinement.
pub fn count_observations(content: &str) -> usize {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("- "))
        .filter(|line| {
            !["[No ", "[AMOUNT]", "[ ]"]
                .iter()
                .any(|placeholder| line.contains(placeholder))
        })
        .count()
}

pub fn memory_dir_path(memory_dir: &Path, file_name: &str) -> PathBuf {
    memory_dir.join(file_name)
}
