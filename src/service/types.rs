//! Service layer result types.

use serde::{Deserialize, Serialize};

/// Person listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonSummary {
    pub name: String,
    /// Whether enrollment has run at least once for this person.
    pub trained: bool,
}

/// Outcome of one enrollment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub person: String,
    /// Embeddings extracted and persisted, one per image that contained
    /// a usable face.
    pub embeddings_added: usize,
    /// Reference images read from the person's namespace.
    pub images_scanned: usize,
}

/// One face found during recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedFace {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    /// Matched person name, or the unknown label.
    pub label: String,
    /// Distance to the matched record; absent for unknown faces.
    pub distance: Option<f32>,
}

/// Recognition result; faces appear in detection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeOutcome {
    pub faces: Vec<RecognizedFace>,
    pub inference_time_ms: u64,
}
