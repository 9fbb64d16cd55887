//! Filesystem image store: one directory per person under a training
//! root, one file per reference image.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Error, Result};

use super::traits::ImageStore;

pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Open the store, creating the root directory when missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a person directory, rejecting names that would escape
    /// the root.
    fn person_dir(&self, name: &str) -> Result<PathBuf> {
        validate_component(name)?;
        Ok(self.root.join(name))
    }
}

/// A name usable as a single path component.
fn validate_component(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::InvalidPersonName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn create_person(&self, name: &str) -> Result<bool> {
        let dir = self.person_dir(name)?;
        if dir.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&dir).await?;
        Ok(true)
    }

    async fn person_exists(&self, name: &str) -> Result<bool> {
        Ok(self.person_dir(name)?.is_dir())
    }

    async fn save_image(&self, person: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.person_dir(person)?;
        if !dir.is_dir() {
            return Err(Error::PersonNotFound(person.to_string()));
        }
        validate_component(filename)?;
        fs::write(dir.join(filename), bytes).await?;
        Ok(())
    }

    async fn list_images(&self, person: &str) -> Result<Vec<Vec<u8>>> {
        let dir = self.person_dir(person)?;
        if !dir.is_dir() {
            return Err(Error::PersonNotFound(person.to_string()));
        }

        // Name-sorted so enrollment iterates deterministically.
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut images = Vec::with_capacity(paths.len());
        for path in paths {
            images.push(fs::read(&path).await?);
        }
        Ok(images)
    }

    async fn list_persons(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_person(&self, person: &str) -> Result<()> {
        let dir = self.person_dir(person)?;
        if !dir.is_dir() {
            return Err(Error::PersonNotFound(person.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}
