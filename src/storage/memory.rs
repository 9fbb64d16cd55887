//! In-memory stores, used by tests and available as embedded backends.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::matcher::{Embedding, KnownFace};

use super::traits::{FaceStore, ImageStore};

/// Record store backed by process memory.
#[derive(Default)]
pub struct MemoryFaceStore {
    inner: Mutex<FaceState>,
}

#[derive(Default)]
struct FaceState {
    records: Vec<KnownFace>,
    trained: HashMap<String, bool>,
}

#[async_trait]
impl FaceStore for MemoryFaceStore {
    async fn load_known(&self) -> Result<Vec<KnownFace>> {
        Ok(self.inner.lock().records.clone())
    }

    async fn record_enrollment(&self, person: &str, embeddings: &[Embedding]) -> Result<()> {
        let mut state = self.inner.lock();
        for embedding in embeddings {
            state.records.push(KnownFace {
                name: person.to_string(),
                embedding: embedding.clone(),
            });
        }
        state.trained.insert(person.to_string(), true);
        Ok(())
    }

    async fn training_status(&self) -> Result<HashMap<String, bool>> {
        Ok(self.inner.lock().trained.clone())
    }

    async fn remove_person(&self, person: &str) -> Result<u64> {
        let mut state = self.inner.lock();
        let before = state.records.len();
        state.records.retain(|r| r.name != person);
        state.trained.remove(person);
        Ok((before - state.records.len()) as u64)
    }

    async fn count_records(&self) -> Result<i64> {
        Ok(self.inner.lock().records.len() as i64)
    }
}

/// Blob store backed by process memory. Images keep insertion order.
#[derive(Default)]
pub struct MemoryImageStore {
    inner: Mutex<HashMap<String, Vec<(String, Vec<u8>)>>>,
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn create_person(&self, name: &str) -> Result<bool> {
        let mut people = self.inner.lock();
        if people.contains_key(name) {
            return Ok(false);
        }
        people.insert(name.to_string(), Vec::new());
        Ok(true)
    }

    async fn person_exists(&self, name: &str) -> Result<bool> {
        Ok(self.inner.lock().contains_key(name))
    }

    async fn save_image(&self, person: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let mut people = self.inner.lock();
        let images = people
            .get_mut(person)
            .ok_or_else(|| Error::PersonNotFound(person.to_string()))?;
        images.push((filename.to_string(), bytes.to_vec()));
        Ok(())
    }

    async fn list_images(&self, person: &str) -> Result<Vec<Vec<u8>>> {
        let people = self.inner.lock();
        let images = people
            .get(person)
            .ok_or_else(|| Error::PersonNotFound(person.to_string()))?;
        Ok(images.iter().map(|(_, bytes)| bytes.clone()).collect())
    }

    async fn list_persons(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_person(&self, person: &str) -> Result<()> {
        self.inner
            .lock()
            .remove(person)
            .map(|_| ())
            .ok_or_else(|| Error::PersonNotFound(person.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_face_store_roundtrip() {
        let store = MemoryFaceStore::default();
        store
            .record_enrollment("alice", &[Embedding::new(vec![1.0])])
            .await
            .unwrap();

        assert_eq!(store.count_records().await.unwrap(), 1);
        assert_eq!(
            store.training_status().await.unwrap().get("alice"),
            Some(&true)
        );

        assert_eq!(store.remove_person("alice").await.unwrap(), 1);
        assert_eq!(store.count_records().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_image_store_namespace_lifecycle() {
        let store = MemoryImageStore::default();

        assert!(store.create_person("alice").await.unwrap());
        assert!(!store.create_person("alice").await.unwrap());

        store.save_image("alice", "a.jpg", &[1, 2]).await.unwrap();
        store.save_image("alice", "b.jpg", &[3]).await.unwrap();
        assert_eq!(
            store.list_images("alice").await.unwrap(),
            vec![vec![1, 2], vec![3]]
        );

        store.delete_person("alice").await.unwrap();
        assert!(!store.person_exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_person_is_not_found() {
        let store = MemoryImageStore::default();

        let err = store.list_images("ghost").await.unwrap_err();
        assert_eq!(err.code(), "PERSON_NOT_FOUND");

        let err = store.save_image("ghost", "a.jpg", &[]).await.unwrap_err();
        assert_eq!(err.code(), "PERSON_NOT_FOUND");
    }
}
