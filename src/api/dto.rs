//! REST request/response data transfer objects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Create-person request body.
#[derive(Debug, Deserialize)]
pub struct CreatePersonRequest {
    pub person_name: String,
}

/// Train-person request body.
#[derive(Debug, Deserialize)]
pub struct TrainPersonRequest {
    pub person_name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PersonDto {
    pub name: String,
    pub trained: bool,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub person: String,
    pub embeddings_added: usize,
    pub images_scanned: usize,
    pub message: String,
}

/// Recognition response. `results` carries one label per detected face
/// in detection order; `faces` carries the full detail.
#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub results: Vec<String>,
    pub faces: Vec<RecognizedFaceDto>,
    pub inference_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct RecognizedFaceDto {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub label: String,
    pub distance: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub models_loaded: HashMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub total_records: i64,
    pub models_loaded: HashMap<String, bool>,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_response_shape() {
        let response = RecognizeResponse {
            results: vec!["Alice".to_string(), "Unknown".to_string()],
            faces: vec![],
            inference_time_ms: 12,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["results"][0], "Alice");
        assert_eq!(json["results"][1], "Unknown");
        assert_eq!(json["inference_time_ms"], 12);
    }

    #[test]
    fn test_error_response_shape() {
        let json =
            serde_json::to_value(ErrorResponse::new("person 'x' is not registered", "PERSON_NOT_FOUND"))
                .unwrap();
        assert_eq!(json["code"], "PERSON_NOT_FOUND");
    }
}
