//! ArcFace-style face embedder.
//!
//! Takes a cropped face image and produces one L2-normalized feature
//! vector of the configured dimensionality.

use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;

use crate::matcher::Embedding;
use crate::utils::math::l2_normalize;

use super::pool::{tensor_from_nchw, tensor_to_vec, ModelKind, ModelPool};
use super::preprocess::{image_to_nchw_bgr, EMBEDDER_INPUT_SIZE};

pub struct FaceEmbedder {
    pool: Arc<ModelPool>,
    embedding_dim: usize,
}

impl FaceEmbedder {
    pub fn new(pool: Arc<ModelPool>, embedding_dim: usize) -> Self {
        Self {
            pool,
            embedding_dim,
        }
    }

    /// Embed a cropped face image.
    pub fn embed(&self, face_crop: &DynamicImage) -> Result<Embedding> {
        let (target_w, target_h) = EMBEDDER_INPUT_SIZE;
        let resized =
            face_crop.resize_exact(target_w, target_h, image::imageops::FilterType::Lanczos3);
        let input = tensor_from_nchw(&image_to_nchw_bgr(&resized))?;

        let model = self.pool.get(ModelKind::Embedder)?;
        let mut request = model.create_infer_request()?;
        request.set_input_tensor(&input)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let mut values = tensor_to_vec(&output)?;
        if values.len() != self.embedding_dim {
            anyhow::bail!(
                "embedder produced {} values, expected {}",
                values.len(),
                self.embedding_dim
            );
        }

        l2_normalize(&mut values);
        Ok(Embedding::new(values))
    }
}
