//! # Search
//!
//! Fan-out over search slots, fan-in into one deduplicated candidate set.

pub mod aggregate;
pub mod executor;
pub mod tools;

pub use aggregate::{aggregate, Aggregation};
pub use executor::{SearchBatch, SearchExecutor, SlotResult};
