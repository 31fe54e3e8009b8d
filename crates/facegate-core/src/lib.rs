//! facegate-core — Identity records and nearest-neighbor face matching.
//!
//! Defines the persisted identity data model, the Euclidean-distance
//! matcher, and the [`EmbeddingSource`] collaborator trait with its
//! ONNX Runtime implementation (face detector + embedding extractor).

pub mod matcher;
pub mod pipeline;
pub mod types;

pub use matcher::{EuclideanMatcher, MatchError, Matcher};
pub use pipeline::{EmbeddingSource, OnnxPipeline, PipelineError};
pub use types::{Embedding, IdentityRecord};
