//! # ImpulseGuard
//!
//! A real-time impulse-purchase decision service: a deterministic Bayesian
//! Fast Stage scores incoming purchase telemetry instantly, and a
//! retrieval-augmented LLM Slow Stage re-reasons over it against four
//! persistent Markdown memory files, optionally mutating them with what it
//! learns.
//!
//! ## Architecture
//!
//! - [`scoring`] — the Fast Stage: a pure Bayesian scoring kernel
//! - [`memory`] — the four-file Markdown memory store and its chunker
//! - [`vector_index`] — embedding-backed retrieval over memory chunks
//! - [`llm`] — a retrying HTTP gateway to the LLM provider
//! - [`reasoner`] — the Slow Stage: prompt assembly and verdict validation
//! - [`mutator`] — applies a verdict's memory update back to disk
//! - [`orchestrator`] — wires the above into one purchase-analysis call
//! - [`server`] — the HTTP surface
//! - [`cost_tracker`] — LLM spend tracking against a daily/monthly budget

pub mod baselines;
pub mod config;
pub mod cost_tracker;
pub mod error;
pub mod llm;
pub mod memory;
pub mod mutator;
pub mod orchestrator;
pub mod reasoner;
pub mod scoring;
pub mod server;
pub mod telemetry;
pub mod vector_index;

pub use baselines::Baselines;
pub use config::Config;
pub use error::{ImpulseError, Result};
pub use orchestrator::{Orchestrator, PurchaseAnalysis};
pub use server::{run_server, AppState};
pub use telemetry::TelemetrySample;
