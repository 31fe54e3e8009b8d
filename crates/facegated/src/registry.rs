//! Registry service — orchestrates the embedding engine and the
//! identity store for registration and identification requests.

use crate::engine::{EngineError, EngineHandle};
use facegate_core::{EuclideanMatcher, IdentityRecord, MatchError, Matcher};
use facegate_store::{IdentityStore, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid image format")]
    InvalidImage,
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no matching faces found")]
    NoMatchFound,
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("embedding engine: {0}")]
    Engine(#[from] EngineError),
}

impl RegistryError {
    /// Caller-visible errors map to 400; the rest are internal faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RegistryError::MissingField(_)
                | RegistryError::InvalidImage
                | RegistryError::NoFaceDetected
                | RegistryError::NoMatchFound
        )
    }
}

/// Orchestrates Embedding Source -> Identity Store (registration) and
/// Embedding Source -> Matcher -> aggregation (identification).
#[derive(Clone)]
pub struct Registry {
    engine: EngineHandle,
    store: IdentityStore,
    threshold: f32,
}

impl Registry {
    pub fn new(engine: EngineHandle, store: IdentityStore, threshold: f32) -> Self {
        Self {
            engine,
            store,
            threshold,
        }
    }

    /// Register every face found in the image under one name/condition.
    ///
    /// Persists one record per detected face at `(name, 0..k-1)`. The
    /// caller is assumed to submit a single-subject enrollment image.
    /// There is no rollback: a persistence failure mid-loop leaves the
    /// records written so far committed.
    pub async fn register(
        &self,
        image_bytes: &[u8],
        name: &str,
        condition: &str,
    ) -> Result<String, RegistryError> {
        let image =
            image::load_from_memory(image_bytes).map_err(|_| RegistryError::InvalidImage)?;

        let embeddings = self.engine.detect_and_embed(image).await?;
        if embeddings.is_empty() {
            return Err(RegistryError::NoFaceDetected);
        }

        let faces = embeddings.len();
        let registered_at = chrono::Utc::now().to_rfc3339();
        for (index, embedding) in embeddings.into_iter().enumerate() {
            let record = IdentityRecord {
                name: name.to_string(),
                condition: condition.to_string(),
                embedding,
                registered_at: registered_at.clone(),
            };
            self.store.put(name, index, &record)?;
        }

        tracing::info!(name, condition, faces, "identity registered");
        Ok(format!(
            "Face registered for {name} with condition {condition}"
        ))
    }

    /// Identify every face in the image against the stored records.
    ///
    /// Faces without an accepted match are silently dropped from the
    /// result; if no face matches (including the zero-face case) the
    /// outcome is `NoMatchFound`.
    pub async fn identify(&self, image_bytes: &[u8]) -> Result<String, RegistryError> {
        let image =
            image::load_from_memory(image_bytes).map_err(|_| RegistryError::InvalidImage)?;

        let embeddings = self.engine.detect_and_embed(image).await?;
        let candidates = self.store.scan()?;

        let matcher = EuclideanMatcher;
        let mut identified = Vec::new();
        for probe in &embeddings {
            match matcher.best_match(probe, &candidates, self.threshold) {
                Ok(Some(record)) => identified.push(record.display()),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "probe embedding rejected");
                    return Err(e.into());
                }
            }
        }

        if identified.is_empty() {
            return Err(RegistryError::NoMatchFound);
        }

        tracing::info!(
            faces = embeddings.len(),
            matched = identified.len(),
            "identification complete"
        );
        Ok(format!("Faces detected: {}", identified.join(", ")))
    }
}
