//! Service configuration

use serde::Deserialize;
use std::path::PathBuf;

use crate::engine::extractor::FacePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub recognition: RecognitionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// OpenVINO device string ("CPU", "GPU", ...).
    pub device: String,
    /// Seconds of inactivity before a loaded model is unloaded.
    pub model_idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub embedder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// Maximum acceptable distance for declaring a match; distances at
    /// or above it yield "Unknown". Overridable per recognize call.
    pub match_threshold: f32,
    /// Minimum detector confidence for a face candidate.
    pub detection_confidence: f32,
    pub embedding_dim: usize,
    /// Which detected face enrollment keeps per reference image.
    pub face_policy: FacePolicy,
    /// Margin added around a detected box before embedding, as a
    /// fraction of the box size.
    pub crop_margin: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub sqlite_path: PathBuf,
    pub training_dir: PathBuf,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 8000 },
            inference: InferenceConfig {
                device: "CPU".to_string(),
                model_idle_timeout: 300,
            },
            models: ModelsConfig {
                detector: PathBuf::from("models/det_10g.onnx"),
                embedder: PathBuf::from("models/w600k_r100.onnx"),
            },
            recognition: RecognitionConfig {
                match_threshold: 0.65,
                detection_confidence: 0.5,
                embedding_dim: 512,
                face_policy: FacePolicy::First,
                crop_margin: 0.2,
            },
            storage: StorageConfig {
                sqlite_path: PathBuf::from("data/faces.db"),
                training_dir: PathBuf::from("data/training"),
            },
        }
    }
}
