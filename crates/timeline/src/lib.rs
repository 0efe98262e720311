use thiserror::Error;

mod model;
pub use model::*;
mod operation;
pub use operation::*;
mod diff;
pub use diff::*;
mod apply;
pub use apply::*;
mod cache;
pub use cache::*;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("invalid operation: {0}")]
    InvalidOp(String),
    #[error("failed to decode operation payload: {0}")]
    Decode(String),
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
    #[error("{1} requires `{0}`")]
    MissingTarget(&'static str, OperationKind),
    #[error("duplicate {collection} id: {id}")]
    DuplicateId { collection: &'static str, id: String },
    #[error("layer not found: {0}")]
    LayerNotFound(LayerId),
    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),
    #[error("audio track not found: {0}")]
    TrackNotFound(TrackId),
    #[error("marker not found: {0}")]
    MarkerNotFound(MarkerId),
}

/// Milliseconds on the timeline; signed so offsets can go negative before normalization.
pub type Millis = i64;
