//! Image decoding and tensor preparation for the face models.

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};
use ndarray::Array4;

use crate::error::Result;

use super::detector::FaceBox;

/// Input size for the face detection model.
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);

/// Input size for the face embedding model.
pub const EMBEDDER_INPUT_SIZE: (u32, u32) = (112, 112);

/// Decode raw bytes (JPEG, PNG, ...) into pixel data.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(data)?)
}

/// Mapping from letterboxed detector input coordinates back to the
/// original image.
#[derive(Debug, Clone, Copy)]
pub struct LetterboxMap {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    pub original_width: u32,
    pub original_height: u32,
}

impl LetterboxMap {
    pub fn new(original: (u32, u32), target: (u32, u32)) -> Self {
        let scale = f32::min(
            target.0 as f32 / original.0 as f32,
            target.1 as f32 / original.1 as f32,
        );
        let scaled_w = (original.0 as f32 * scale) as u32;
        let scaled_h = (original.1 as f32 * scale) as u32;

        Self {
            scale,
            offset_x: ((target.0 - scaled_w) / 2) as f32,
            offset_y: ((target.1 - scaled_h) / 2) as f32,
            original_width: original.0,
            original_height: original.1,
        }
    }

    /// Map a point in detector input space back to original image space.
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

/// Letterbox an image into the detector input size and convert it to an
/// input tensor.
pub fn detector_input(image: &DynamicImage) -> Array4<f32> {
    let (target_w, target_h) = DETECTOR_INPUT_SIZE;
    let boxed = letterbox(image, target_w, target_h);
    image_to_nchw_bgr(&boxed)
}

/// Resize into the target while preserving aspect ratio, centering the
/// result on a black canvas.
fn letterbox(image: &DynamicImage, target_w: u32, target_h: u32) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();
    let scale = f32::min(
        target_w as f32 / orig_w as f32,
        target_h as f32 / orig_h as f32,
    );
    let scaled_w = (orig_w as f32 * scale) as u32;
    let scaled_h = (orig_h as f32 * scale) as u32;

    let resized = image
        .resize_exact(scaled_w, scaled_h, image::imageops::FilterType::Lanczos3)
        .to_rgb8();

    let mut canvas = ImageBuffer::from_pixel(target_w, target_h, Rgb([0u8, 0, 0]));
    let offset_x = (target_w - scaled_w) / 2;
    let offset_y = (target_h - scaled_h) / 2;
    for (x, y, pixel) in resized.enumerate_pixels() {
        canvas.put_pixel(x + offset_x, y + offset_y, *pixel);
    }

    DynamicImage::ImageRgb8(canvas)
}

/// Convert an image to an NCHW tensor in BGR channel order with
/// InsightFace normalization, (value - 127.5) / 128.
pub fn image_to_nchw_bgr(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = (pixel[2] as f32 - 127.5) / 128.0; // B
        tensor[[0, 1, y, x]] = (pixel[1] as f32 - 127.5) / 128.0; // G
        tensor[[0, 2, y, x]] = (pixel[0] as f32 - 127.5) / 128.0; // R
    }

    tensor
}

/// Crop a detected face box with a proportional margin, clamped to the
/// image bounds.
pub fn crop_face(image: &DynamicImage, face: &FaceBox, margin: f32) -> DynamicImage {
    let pad_x = (face.x2 - face.x1) * margin;
    let pad_y = (face.y2 - face.y1) * margin;

    let x1 = (face.x1 - pad_x).max(0.0) as u32;
    let y1 = (face.y1 - pad_y).max(0.0) as u32;
    let x2 = ((face.x2 + pad_x).max(0.0) as u32).min(image.width());
    let y2 = ((face.y2 + pad_y).max(0.0) as u32).min(image.height());

    let width = x2.saturating_sub(x1).max(1);
    let height = y2.saturating_sub(y1).max(1);
    image.crop_imm(x1, y1, width, height)
}
