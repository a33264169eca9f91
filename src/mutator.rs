//! Memory Mutator (component F): routes a reasoning verdict's
//! `memory_update` to a target file, chooses between simple append and
//! LLM-assisted refinement, and writes it back atomically, verifying the
//! write before discarding the backup copy.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ImpulseError, Result};
use crate::llm::LlmGateway;
use crate::memory::{count_observations, determine_target_file, MemoryStore};
use crate::reasoner;
use crate::vector_index::VectorIndex;

const MAX_OBSERVATIONS: usize = 5;
const OBSERVED_BEHAVIORS_HEADER: &str = "## Observed Behaviors";

/// Outcome of a single mutation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied { file: String },
    NoChange { reason: String },
    Failed { reason: String },
}

pub struct MemoryMutator<'a> {
    store: &'a MemoryStore,
    index: &'a dyn VectorIndex,
    gateway: &'a LlmGateway,
    refinement_threshold: usize,
}

impl<'a> MemoryMutator<'a> {
    pub fn new(
        store: &'a MemoryStore,
        index: &'a dyn VectorIndex,
        gateway: &'a LlmGateway,
        refinement_threshold: usize,
    ) -> Self {
        Self {
            store,
            index,
            gateway,
            refinement_threshold,
        }
    }

    /// Apply a non-empty memory update end to end: resolve the target file,
    /// back it up, append or refine, stamp, verify the write, and reindex.
    pub async fn apply(&self, memory_update: &str) -> MutationOutcome {
        let update = memory_update.trim();
        if update.is_empty() {
            return MutationOutcome::NoChange {
                reason: "empty memory update".to_string(),
            };
        }

        let target_file = determine_target_file(update);
        let path = self.store.path_for(target_file);
        if !path.exists() {
            return MutationOutcome::NoChange {
                reason: format!("{target_file} does not exist"),
            };
        }

        let current_content = match self.store.read_file(target_file) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = target_file, error = %e, "could not read target file");
                return MutationOutcome::NoChange {
                    reason: format!("could not read {target_file}: {e}"),
                };
            }
        };

        let mut backup_name = path.as_os_str().to_os_string();
        backup_name.push(".backup");
        let backup_path = std::path::PathBuf::from(backup_name);
        if let Err(e) = std::fs::copy(&path, &backup_path) {
            warn!(file = target_file, error = %e, "could not create backup");
            return MutationOutcome::Failed {
                reason: format!("backup failed: {e}"),
            };
        }

        let observation_count = count_observations(&current_content);
        let new_content = if observation_count > self.refinement_threshold {
            info!(
                file = target_file,
                observation_count, "observation count exceeds threshold, attempting LLM refinement"
            );
            match reasoner::refine_memory(self.gateway, &current_content, update).await {
                Ok(Some(refined)) if refined.trim() != current_content.trim() => refined,
                _ => simple_append_update(&current_content, update),
            }
        } else {
            simple_append_update(&current_content, update)
        };

        if new_content.trim() == current_content.trim() {
            let _ = std::fs::remove_file(&backup_path);
            return MutationOutcome::NoChange {
                reason: format!("{target_file} already at observation cap"),
            };
        }

        let stamped = stamp_last_updated(&new_content);

        match self.write_verified(&path, &stamped) {
            Ok(()) => {}
            Err(e) => {
                warn!(file = target_file, error = %e, "write verification failed, restored backup");
                let _ = std::fs::copy(&backup_path, &path);
                let _ = std::fs::remove_file(&backup_path);
                return MutationOutcome::Failed {
                    reason: format!("write verify mismatch for {target_file}: {e}"),
                };
            }
        }

        if let Err(e) = self.index.upsert_file(target_file, &stamped).await {
            warn!(file = target_file, error = %e, "vector index upsert failed, file write stands");
        }

        let _ = std::fs::remove_file(&backup_path);

        MutationOutcome::Applied {
            file: target_file.to_string(),
        }
    }

    fn write_verified(&self, path: &std::path::Path, content: &str) -> Result<()> {
        std::fs::write(path, content)?;
        let verify = std::fs::read_to_string(path)?;
        if verify != content {
            return Err(ImpulseError::WriteVerifyMismatch(path.to_path_buf()));
        }
        Ok(())
    }

    /// Consolidation sweep: run over every memory file whose size or
    /// observation count exceeds the given thresholds, rewriting it via
    /// LLM refinement.
    pub async fn consolidate(
        &self,
        size_threshold: usize,
        observation_threshold: usize,
    ) -> Vec<ConsolidationResult> {
        let mut results = Vec::new();
        let files = match self.store.read_all() {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "could not read memory files for consolidation");
                return results;
            }
        };

        for (file_name, content) in files {
            let size_before = content.len();
            let observations_before = count_observations(&content);

            if size_before <= size_threshold && observations_before <= observation_threshold {
                results.push(ConsolidationResult {
                    file: file_name,
                    status: ConsolidationStatus::Skipped,
                    size_before,
                    size_after: size_before,
                    observations_before,
                    observations_after: observations_before,
                });
                continue;
            }

            let refined = reasoner::refine_memory(self.gateway, &content, "")
                .await
                .ok()
                .flatten();

            let Some(refined) = refined else {
                results.push(ConsolidationResult {
                    file: file_name,
                    status: ConsolidationStatus::Error,
                    size_before,
                    size_after: size_before,
                    observations_before,
                    observations_after: observations_before,
                });
                continue;
            };

            let stamped = stamp_last_updated(&refined);
            let path = self.store.path_for(&file_name);
            if self.write_verified(&path, &stamped).is_err() {
                results.push(ConsolidationResult {
                    file: file_name,
                    status: ConsolidationStatus::Error,
                    size_before,
                    size_after: size_before,
                    observations_before,
                    observations_after: observations_before,
                });
                continue;
            }

            let files = match self.store.read_all() {
                Ok(f) => f,
                Err(_) => Vec::new(),
            };
            let _ = self.index.reindex(&files).await;

            results.push(ConsolidationResult {
                file: file_name,
                status: ConsolidationStatus::Consolidated,
                size_before,
                size_after: stamped.len(),
                observations_before,
                observations_after: count_observations(&stamped),
            });
        }

        results
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStatus {
    Consolidated,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationResult {
    pub file: String,
    pub status: ConsolidationStatus,
    pub size_before: usize,
    pub size_after: usize,
    pub observations_before: usize,
    pub observations_after: usize,
}

/// Simple append write path: replace the placeholder if present, otherwise
/// insert under `## Observed Behaviors` while under the observation cap,
/// otherwise drop the update.
pub fn simple_append_update(current_content: &str, new_observation: &str) -> String {
    if let Some(pos) = current_content.find("- [No patterns recorded yet]") {
        let mut out = String::with_capacity(current_content.len() + new_observation.len());
        out.push_str(&current_content[..pos]);
        out.push_str(&format!("- {new_observation}"));
        out.push_str(&current_content[pos + "- [No patterns recorded yet]".len()..]);
        return out;
    }

    let observation_count = count_observations(current_content);
    if observation_count >= MAX_OBSERVATIONS {
        return current_content.to_string();
    }

    if current_content.contains(OBSERVED_BEHAVIORS_HEADER) {
        let mut lines: Vec<String> = current_content.lines().map(str::to_string).collect();
        if let Some(idx) = lines.iter().position(|l| l.contains(OBSERVED_BEHAVIORS_HEADER)) {
            lines.insert(idx + 1, format!("- {new_observation}"));
        }
        let mut out = lines.join("\n");
        if current_content.ends_with('\n') {
            out.push('\n');
        }
        out
    } else {
        format!(
            "{}\n\n{OBSERVED_BEHAVIORS_HEADER}\n- {new_observation}\n",
            current_content.trim_end()
        )
    }
}

/// Ensure a single `## Last Updated` trailer with the current timestamp,
/// replacing a prior one if present.
fn stamp_last_updated(content: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let header = "## Last Updated";

    if let Some(pos) = content.find(header) {
        let before = &content[..pos];
        let after_header = &content[pos + header.len()..];
        let rest_start = after_header
            .find('\n')
            .map(|i| i + 1)
            .unwrap_or(after_header.len());
        let after_timestamp_line = &after_header[rest_start..];
        let next_section_offset = after_timestamp_line.find('\n').unwrap_or(after_timestamp_line.len());
        let remainder = &after_timestamp_line[next_section_offset..];
        format!("{before}{header}\n- {timestamp}{remainder}")
    } else {
        format!("{}\n\n{header}\n- {timestamp}\n", content.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_placeholder_with_first_observation() {
        let content = "# Behavior\n\n## Observed Behaviors\n- [No patterns recorded yet]\n";
        let updated = simple_append_update(content, "buys shoes on payday");
        assert!(!updated.contains("[No patterns recorded yet]"));
        assert!(updated.contains("- buys shoes on payday"));
    }

    #[test]
    fn appends_under_cap() {
        let content = "## Observed Behaviors\n- buys coffee daily\n";
        let updated = simple_append_update(content, "browses late at night");
        assert_eq!(count_observations(&updated), 2);
        assert!(updated.contains("- browses late at night"));
    }

    #[test]
    fn drops_update_at_cap() {
        let content = "## Observed Behaviors\n- a\n- b\n- c\n- d\n- e\n";
        let updated = simple_append_update(content, "f");
        assert_eq!(updated, content);
    }

    #[test]
    fn creates_section_when_absent() {
        let content = "# Behavior\n";
        let updated = simple_append_update(content, "new pattern");
        assert!(updated.contains(OBSERVED_BEHAVIORS_HEADER));
        assert!(updated.contains("- new pattern"));
    }

    #[test]
    fn stamps_fresh_timestamp_when_absent() {
        let content = "# Goals\n- a goal\n";
        let stamped = stamp_last_updated(content);
        assert!(stamped.contains("## Last Updated"));
    }

    #[test]
    fn replaces_existing_timestamp() {
        let content = "# Goals\n- a goal\n\n## Last Updated\n- 2020-01-01 00:00:00\n";
        let stamped = stamp_last_updated(content);
        assert!(!stamped.contains("2020-01-01"));
        assert!(stamped.contains("## Last Updated"));
    }
}
