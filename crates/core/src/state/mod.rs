pub mod archive;
pub mod context;
pub mod db;

pub use archive::CheckpointArchive;
pub use context::{
    Checkpoint, IterationMetrics, PipelineContext, RefinementEntry, SearchMetrics,
};
pub use db::{EvidenceDb, RunRecord};
