//! Crate-wide error taxonomy.
//!
//! "Zero faces detected" and "no match under threshold" are normal
//! outcomes and never surface here; they are represented by empty
//! results and the `Unknown` label respectively.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The named person has no registered image namespace.
    #[error("person '{0}' is not registered")]
    PersonNotFound(String),

    /// A person name that cannot form a storage namespace.
    #[error("invalid person name '{0}'")]
    InvalidPersonName(String),

    /// The submitted bytes could not be decoded as an image.
    #[error("could not decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Query and stored embeddings disagree on dimensionality.
    #[error("embedding dimension mismatch: query has {query} values, record has {stored}")]
    DimensionMismatch { query: usize, stored: usize },

    /// A stored embedding blob is not a whole number of f32 values.
    #[error("stored embedding blob of {0} bytes is not a whole number of f32 values")]
    CorruptEmbedding(usize),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Feature extraction backend failure (model load, inference).
    #[error("feature extraction failed: {0}")]
    Inference(anyhow::Error),
}

impl Error {
    /// Stable machine-readable kind, used by the API layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::PersonNotFound(_) => "PERSON_NOT_FOUND",
            Error::InvalidPersonName(_) => "INVALID_PERSON_NAME",
            Error::ImageDecode(_) => "IMAGE_DECODE_FAILED",
            Error::DimensionMismatch { .. } | Error::CorruptEmbedding(_) => "DIMENSION_MISMATCH",
            Error::Database(_) | Error::Io(_) => "STORAGE_FAILED",
            Error::Inference(_) => "INFERENCE_FAILED",
        }
    }
}
