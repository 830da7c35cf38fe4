//! # Evidence Core
//!
//! Iterative, quality-gated literature retrieval for clinical case reports.
//!
//! ## Architecture
//!
//! - `generation/` - The text-generation backend behind one trait, plus the
//!   radkit-backed LLM implementation and its search tools
//! - `parsing` / `records` - Tolerant extraction and normalization of
//!   generated output into typed queries and candidate records
//! - `search/` - Bounded concurrent fan-out and result aggregation
//! - `scoring` / `quality` - Multi-dimensional scoring, selection and the
//!   quality gate
//! - `citations/` - Source registry and inline citation resolution
//! - `state/` - Pipeline context, checkpoints and the SQLite archive
//! - `pipeline/` - The iteration controller
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evidence_core::config::PipelineConfig;
//! use evidence_core::generation::LlmGenerator;
//! use evidence_core::models::GeneratorConfig;
//! use evidence_core::pipeline::IterationController;
//! use std::sync::Arc;
//!
//! let generator = Arc::new(LlmGenerator::new(GeneratorConfig::default()));
//! let mut controller = IterationController::new(PipelineConfig::default(), generator);
//! let result = controller.run("62-year-old with relapsed KMT2A-r AML").await?;
//! ```

pub mod citations;
pub mod config;
pub mod generation;
pub mod models;
pub mod parsing;
pub mod pipeline;
pub mod quality;
pub mod records;
pub mod scoring;
pub mod search;
pub mod state;

pub use config::PipelineConfig;
pub use pipeline::{IterationController, PipelineResult};
