use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Address the HTTP server binds to (default: 127.0.0.1:5000).
    pub bind_addr: String,
    /// Directory holding identity record files.
    pub storage_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum accepted Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Canonical embedding dimensionality enforced by the store.
    pub embedding_dim: usize,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let storage_dir = std::env::var("FACEGATE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facegate_store::default_storage_dir());

        Self {
            bind_addr: std::env::var("FACEGATE_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5000".to_string()),
            storage_dir,
            model_dir: std::env::var("FACEGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            match_threshold: env_f32(
                "FACEGATE_MATCH_THRESHOLD",
                facegate_core::matcher::DEFAULT_MATCH_THRESHOLD,
            ),
            embedding_dim: env_usize("FACEGATE_EMBEDDING_DIM", 128),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the embedding extraction model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("mobilefacenet.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
