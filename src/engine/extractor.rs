//! Feature extraction seam: fused face detection + embedding.
//!
//! Pipelines only ever see the `FeatureExtractor` trait; the OpenVINO
//! implementation below is one backend, and tests substitute their own.

use std::sync::Arc;

use image::DynamicImage;
use serde::Deserialize;

use crate::matcher::Embedding;

use super::detector::{FaceBox, FaceDetector};
use super::embedder::FaceEmbedder;
use super::pool::ModelPool;
use super::preprocess::crop_face;

/// One detected face with its embedding, in detection order.
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub face: FaceBox,
    pub embedding: Embedding,
}

/// Which detected face enrollment keeps when a reference image contains
/// several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacePolicy {
    /// The face the detector reported first.
    First,
    /// The face with the largest box area.
    Largest,
    /// The face the detector was most confident about.
    HighestConfidence,
}

/// Select one observation according to the policy. Ties keep the
/// earlier observation; an empty slice yields `None`.
pub fn select_face(
    observations: &[FaceObservation],
    policy: FacePolicy,
) -> Option<&FaceObservation> {
    match policy {
        FacePolicy::First => observations.first(),
        FacePolicy::Largest => pick_by(observations, |o| o.face.area()),
        FacePolicy::HighestConfidence => pick_by(observations, |o| o.face.confidence),
    }
}

fn pick_by<F>(observations: &[FaceObservation], key: F) -> Option<&FaceObservation>
where
    F: Fn(&FaceObservation) -> f32,
{
    let mut best: Option<(&FaceObservation, f32)> = None;
    for observation in observations {
        let k = key(observation);
        match best {
            Some((_, best_k)) if best_k >= k => {}
            _ => best = Some((observation, k)),
        }
    }
    best.map(|(observation, _)| observation)
}

/// Detection and embedding as one black-box capability.
pub trait FeatureExtractor: Send + Sync {
    /// Detect every face in the image and embed each one, preserving
    /// detection order. An image with no faces yields an empty vec.
    fn detect_and_embed(&self, image: &DynamicImage) -> anyhow::Result<Vec<FaceObservation>>;
}

/// OpenVINO-backed extractor: SCRFD detection, margin crop, ArcFace
/// embedding.
pub struct OpenVinoExtractor {
    detector: FaceDetector,
    embedder: FaceEmbedder,
    crop_margin: f32,
}

impl OpenVinoExtractor {
    pub fn new(
        pool: Arc<ModelPool>,
        detection_confidence: f32,
        embedding_dim: usize,
        crop_margin: f32,
    ) -> Self {
        Self {
            detector: FaceDetector::new(pool.clone(), detection_confidence),
            embedder: FaceEmbedder::new(pool, embedding_dim),
            crop_margin,
        }
    }
}

impl FeatureExtractor for OpenVinoExtractor {
    fn detect_and_embed(&self, image: &DynamicImage) -> anyhow::Result<Vec<FaceObservation>> {
        let faces = self.detector.detect(image)?;

        let mut observations = Vec::with_capacity(faces.len());
        for face in faces {
            let crop = crop_face(image, &face, self.crop_margin);
            let embedding = self.embedder.embed(&crop)?;
            observations.push(FaceObservation { face, embedding });
        }
        Ok(observations)
    }
}
