//! Persistence seams for enrolled records and training images.
//!
//! Implementations can be swapped between SQLite, the filesystem and
//! in-memory backends.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::matcher::{Embedding, KnownFace};

/// Record store for enrolled embeddings and per-person training status.
///
/// Implementations must use keyed writes: two concurrent enrollments
/// for distinct people must both be durable afterwards, with no lost
/// update.
#[async_trait]
pub trait FaceStore: Send + Sync + 'static {
    /// Load every enrolled record. Iteration order is stable between
    /// calls so that matching tie-breaks are repeatable.
    async fn load_known(&self) -> Result<Vec<KnownFace>>;

    /// Append one enrollment batch and mark the person trained. Both
    /// take effect together or not at all.
    async fn record_enrollment(&self, person: &str, embeddings: &[Embedding]) -> Result<()>;

    /// Map of person name to trained flag. Absent names are untrained.
    async fn training_status(&self) -> Result<HashMap<String, bool>>;

    /// Remove every record and the training flag for a person. Returns
    /// the number of records removed.
    async fn remove_person(&self, person: &str) -> Result<u64>;

    /// Total number of enrolled records.
    async fn count_records(&self) -> Result<i64>;
}

/// Blob store for per-person reference images.
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    /// Create the namespace for a person. Returns false when it already
    /// existed.
    async fn create_person(&self, name: &str) -> Result<bool>;

    async fn person_exists(&self, name: &str) -> Result<bool>;

    /// Store one reference image under the person's namespace. Fails
    /// with `PersonNotFound` when the namespace is absent.
    async fn save_image(&self, person: &str, filename: &str, bytes: &[u8]) -> Result<()>;

    /// All stored images for a person, in a deterministic order. Fails
    /// with `PersonNotFound` when the namespace is absent.
    async fn list_images(&self, person: &str) -> Result<Vec<Vec<u8>>>;

    async fn list_persons(&self) -> Result<Vec<String>>;

    /// Remove the namespace and every image in it. Fails with
    /// `PersonNotFound` when the namespace is absent.
    async fn delete_person(&self, person: &str) -> Result<()>;
}
