//! Process configuration, loaded from environment variables (with an
//! optional `.env` file via `dotenvy`) through a single `Config::load()`
//! entry point with fail-fast validation.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{ImpulseError, Result};
use crate::scoring::weights::WeightProfile;

/// Process-wide configuration recognized by the service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the four memory Markdown files. Required.
    pub memory_dir: PathBuf,

    /// Path to a service-account JSON key file. If absent, the Reasoner
    /// operates permanently in degraded mode.
    pub llm_credentials_path: Option<PathBuf>,

    /// Prior probability of impulse state, in (0,1).
    pub prior_p: f64,

    /// Named feature-weight profile for the Scoring Kernel.
    pub weight_profile: WeightProfile,

    /// Observation-count threshold above which memory appends switch from
    /// textual append to LLM-assisted consolidation.
    pub refinement_threshold: usize,

    /// Byte-size threshold that triggers the consolidation sweep.
    pub consolidation_size_threshold: usize,

    /// Observation-count threshold that triggers the consolidation sweep.
    pub consolidation_observation_threshold: usize,

    /// Directory holding the vector index's persistent state. Defaults to
    /// `<memory_dir>/.vector-index`.
    pub vector_index_dir: PathBuf,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Request-level latency ceiling: also used as the HTTP client timeout
    /// for LLM calls, so a stuck reasoning call can't hang a request
    /// indefinitely.
    pub request_timeout_secs: u64,

    /// LLM model identifier, passed straight through to the generateContent
    /// endpoint path.
    pub llm_model: String,

    /// Base URL for the LLM provider's API.
    pub llm_base_url: String,
}

impl Config {
    /// Load configuration from the environment, applying defaults for
    /// everything but `memory_dir`. Fails fast if `memory_dir` is absent or
    /// other values are out of range.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let memory_dir = std::env::var("IMPULSEGUARD_MEMORY_DIR")
            .map(PathBuf::from)
            .map_err(|_| {
                ImpulseError::config("IMPULSEGUARD_MEMORY_DIR is required but not set")
            })?;

        let llm_credentials_path = std::env::var("IMPULSEGUARD_LLM_CREDENTIALS_PATH")
            .ok()
            .map(PathBuf::from);

        let prior_p = env_f64("IMPULSEGUARD_PRIOR_P", 0.2)?;
        if !(0.0..1.0).contains(&prior_p) || prior_p <= 0.0 {
            return Err(ImpulseError::config(format!(
                "prior_p must be in (0,1), got {prior_p}"
            )));
        }

        let weight_profile = match std::env::var("IMPULSEGUARD_WEIGHT_PROFILE")
            .unwrap_or_else(|_| "behavior_only".to_string())
            .as_str()
        {
            "behavior_only" => WeightProfile::BehaviorOnly,
            "full_biometric" => WeightProfile::FullBiometric,
            other => {
                return Err(ImpulseError::config(format!(
                    "unknown weight_profile '{other}'"
                )))
            }
        };

        let refinement_threshold = env_usize("IMPULSEGUARD_REFINEMENT_THRESHOLD", 7)?;
        let consolidation_size_threshold =
            env_usize("IMPULSEGUARD_CONSOLIDATION_SIZE_THRESHOLD", 2048)?;
        let consolidation_observation_threshold =
            env_usize("IMPULSEGUARD_CONSOLIDATION_OBSERVATION_THRESHOLD", 10)?;

        let vector_index_dir = std::env::var("IMPULSEGUARD_VECTOR_INDEX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| memory_dir.join(".vector-index"));

        let bind_addr: SocketAddr = std::env::var("IMPULSEGUARD_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ImpulseError::config(format!("invalid IMPULSEGUARD_BIND_ADDR: {e}")))?;

        let request_timeout_secs = env_u64("IMPULSEGUARD_REQUEST_TIMEOUT_SECS", 90)?;

        let llm_model = std::env::var("IMPULSEGUARD_LLM_MODEL")
            .unwrap_or_else(|_| "gemini-1.5-pro".to_string());
        let llm_base_url = std::env::var("IMPULSEGUARD_LLM_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1".to_string());

        Ok(Self {
            memory_dir,
            llm_credentials_path,
            prior_p,
            weight_profile,
            refinement_threshold,
            consolidation_size_threshold,
            consolidation_observation_threshold,
            vector_index_dir,
            bind_addr,
            request_timeout_secs,
            llm_model,
            llm_base_url,
        })
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| ImpulseError::config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| ImpulseError::config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| ImpulseError::config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_fails_without_memory_dir() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("IMPULSEGUARD_MEMORY_DIR");
        assert!(Config::load().is_err());
    }

    #[test]
    fn load_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("IMPULSEGUARD_MEMORY_DIR", "/tmp/impulseguard-test-memory");
        std::env::remove_var("IMPULSEGUARD_PRIOR_P");
        let cfg = Config::load().unwrap();
        assert_eq!(cfg.prior_p, 0.2);
        assert_eq!(cfg.refinement_threshold, 7);
        assert_eq!(cfg.consolidation_size_threshold, 2048);
        std::env::remove_var("IMPULSEGUARD_MEMORY_DIR");
    }
}
