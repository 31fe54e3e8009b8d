use serde::{Deserialize, Serialize};

/// Face embedding vector (128-dimensional for the default embedder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding of the same dimensionality.
    ///
    /// Callers are responsible for checking dimensions first; trailing
    /// components of the longer vector are ignored by `zip`.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A persisted identity: a name, a condition label assigned at
/// registration time, and one face embedding.
///
/// Records are addressed by `(name, sequence_index)` where the index is
/// the position of the face among those detected in the registration
/// image. Names are not unique across records: a multi-face image
/// produces one record per face, all under the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub condition: String,
    pub embedding: Embedding,
    /// RFC 3339 timestamp of the registration that wrote this record.
    pub registered_at: String,
}

impl IdentityRecord {
    /// Human-readable form used in identification responses.
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.condition)
    }
}
