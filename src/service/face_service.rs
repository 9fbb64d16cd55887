//! Core orchestration: person registry, enrollment, recognition.
//!
//! Every call reloads persisted state fresh; no known-face data is
//! cached across requests. Decoding and feature extraction are
//! CPU-bound and run on the blocking thread pool.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::Config;
use crate::engine::extractor::{select_face, FaceObservation, FeatureExtractor};
use crate::engine::preprocess::decode_image;
use crate::error::{Error, Result};
use crate::matcher::{find_best, Embedding, MatchOutcome};
use crate::storage::{FaceStore, ImageStore};

use super::types::{EnrollOutcome, PersonSummary, RecognizeOutcome, RecognizedFace};

/// Label reported for a face that matched no enrolled record.
pub const UNKNOWN_LABEL: &str = "Unknown";

pub struct FaceService<S: FaceStore, I: ImageStore> {
    extractor: Arc<dyn FeatureExtractor>,
    faces: Arc<S>,
    images: Arc<I>,
    config: Config,
}

impl<S: FaceStore, I: ImageStore> FaceService<S, I> {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        faces: Arc<S>,
        images: Arc<I>,
        config: Config,
    ) -> Self {
        Self {
            extractor,
            faces,
            images,
            config,
        }
    }

    /// Record store handle, for metrics reporting.
    pub fn faces(&self) -> &Arc<S> {
        &self.faces
    }

    /// Create a person namespace. Returns false when it already existed.
    pub async fn create_person(&self, name: &str) -> Result<bool> {
        self.images.create_person(name).await
    }

    /// Store reference images for an existing person.
    pub async fn add_images(&self, person: &str, files: Vec<(String, Vec<u8>)>) -> Result<usize> {
        if !self.images.person_exists(person).await? {
            return Err(Error::PersonNotFound(person.to_string()));
        }
        let count = files.len();
        for (filename, bytes) in files {
            self.images.save_image(person, &filename, &bytes).await?;
        }
        Ok(count)
    }

    /// List registered persons with their training status. A person
    /// absent from the status map has simply not been enrolled yet.
    pub async fn list_persons(&self) -> Result<Vec<PersonSummary>> {
        let status = self.faces.training_status().await?;
        let names = self.images.list_persons().await?;

        Ok(names
            .into_iter()
            .map(|name| {
                let trained = status.get(&name).copied().unwrap_or(false);
                PersonSummary { name, trained }
            })
            .collect())
    }

    /// Delete a person's images, records and training status. Returns
    /// the number of records removed.
    pub async fn delete_person(&self, person: &str) -> Result<u64> {
        if !self.images.person_exists(person).await? {
            return Err(Error::PersonNotFound(person.to_string()));
        }
        self.images.delete_person(person).await?;
        let removed = self.faces.remove_person(person).await?;
        info!(person, removed, "person deleted");
        Ok(removed)
    }

    /// Enrollment pipeline: read every stored image for the person,
    /// extract one embedding per image that contains a face, persist
    /// the batch and mark the person trained.
    ///
    /// Images in which no face is detected contribute nothing and raise
    /// no error.
    pub async fn enroll(&self, person: &str) -> Result<EnrollOutcome> {
        if !self.images.person_exists(person).await? {
            return Err(Error::PersonNotFound(person.to_string()));
        }
        let images = self.images.list_images(person).await?;
        let images_scanned = images.len();

        let extractor = self.extractor.clone();
        let policy = self.config.recognition.face_policy;
        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Embedding>> {
            let mut embeddings = Vec::new();
            for bytes in &images {
                let image = decode_image(bytes)?;
                let observations = extractor.detect_and_embed(&image).map_err(Error::Inference)?;
                if let Some(observation) = select_face(&observations, policy) {
                    embeddings.push(observation.embedding.clone());
                }
            }
            Ok(embeddings)
        })
        .await
        .map_err(|e| Error::Inference(e.into()))??;

        self.faces.record_enrollment(person, &embeddings).await?;

        info!(
            person,
            added = embeddings.len(),
            scanned = images_scanned,
            "enrollment complete"
        );
        Ok(EnrollOutcome {
            person: person.to_string(),
            embeddings_added: embeddings.len(),
            images_scanned,
        })
    }

    /// Recognition pipeline: decode the image, extract every face, and
    /// match each one independently against the full known set.
    ///
    /// An image with zero detectable faces yields an empty face list.
    pub async fn recognize(
        &self,
        image_bytes: Vec<u8>,
        threshold: Option<f32>,
    ) -> Result<RecognizeOutcome> {
        let start = Instant::now();
        let threshold = threshold.unwrap_or(self.config.recognition.match_threshold);

        let extractor = self.extractor.clone();
        let observations =
            tokio::task::spawn_blocking(move || -> Result<Vec<FaceObservation>> {
                let image = decode_image(&image_bytes)?;
                extractor.detect_and_embed(&image).map_err(Error::Inference)
            })
            .await
            .map_err(|e| Error::Inference(e.into()))??;

        // The known set is reloaded on every call; nothing is cached
        // across requests.
        let known = self.faces.load_known().await?;

        let mut faces = Vec::with_capacity(observations.len());
        for observation in &observations {
            let (label, distance) = match find_best(&observation.embedding, &known, threshold)? {
                MatchOutcome::Identified { name, distance } => (name, Some(distance)),
                MatchOutcome::Unknown => (UNKNOWN_LABEL.to_string(), None),
            };
            faces.push(RecognizedFace {
                x1: observation.face.x1,
                y1: observation.face.y1,
                x2: observation.face.x2,
                y2: observation.face.y2,
                confidence: observation.face.confidence,
                label,
                distance,
            });
        }

        debug!(faces = faces.len(), threshold, "recognition complete");
        Ok(RecognizeOutcome {
            faces,
            inference_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use image::{DynamicImage, ImageBuffer, Rgb};

    use crate::engine::detector::FaceBox;
    use crate::engine::extractor::FacePolicy;
    use crate::storage::{MemoryFaceStore, MemoryImageStore};

    /// Extractor stub keyed by image dimensions, so tests can decide
    /// which "faces" an image contains.
    struct StubExtractor {
        by_size: HashMap<(u32, u32), Vec<FaceObservation>>,
    }

    impl FeatureExtractor for StubExtractor {
        fn detect_and_embed(
            &self,
            image: &DynamicImage,
        ) -> anyhow::Result<Vec<FaceObservation>> {
            let size = (image.width(), image.height());
            Ok(self.by_size.get(&size).cloned().unwrap_or_default())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img =
            DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([0u8, 0, 0])));
        let mut buffer = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn observation(x2: f32, confidence: f32, values: Vec<f32>) -> FaceObservation {
        FaceObservation {
            face: FaceBox {
                x1: 0.0,
                y1: 0.0,
                x2,
                y2: x2,
                confidence,
            },
            embedding: Embedding::new(values),
        }
    }

    type TestService = FaceService<MemoryFaceStore, MemoryImageStore>;

    fn service_with(
        by_size: HashMap<(u32, u32), Vec<FaceObservation>>,
        config: Config,
    ) -> TestService {
        FaceService::new(
            Arc::new(StubExtractor { by_size }),
            Arc::new(MemoryFaceStore::default()),
            Arc::new(MemoryImageStore::default()),
            config,
        )
    }

    #[tokio::test]
    async fn test_enroll_unregistered_person_fails() {
        let service = service_with(HashMap::new(), Config::default());
        let err = service.enroll("ghost").await.unwrap_err();
        assert_eq!(err.code(), "PERSON_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_enroll_skips_images_without_faces() {
        let mut by_size = HashMap::new();
        by_size.insert((8, 8), vec![observation(10.0, 0.9, vec![1.0, 0.0])]);
        by_size.insert((10, 10), vec![observation(10.0, 0.9, vec![0.0, 1.0])]);
        // (9, 9) intentionally absent: that image has no detectable face.

        let service = service_with(by_size, Config::default());
        service.create_person("alice").await.unwrap();
        service
            .add_images(
                "alice",
                vec![
                    ("a.png".into(), png(8, 8)),
                    ("b.png".into(), png(9, 9)),
                    ("c.png".into(), png(10, 10)),
                ],
            )
            .await
            .unwrap();

        let outcome = service.enroll("alice").await.unwrap();
        assert_eq!(outcome.images_scanned, 3);
        assert_eq!(outcome.embeddings_added, 2);

        let known = service.faces().load_known().await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.iter().all(|r| r.name == "alice"));
    }

    #[tokio::test]
    async fn test_enroll_zero_faces_still_marks_trained() {
        let service = service_with(HashMap::new(), Config::default());
        service.create_person("bob").await.unwrap();
        service
            .add_images("bob", vec![("a.png".into(), png(5, 5))])
            .await
            .unwrap();

        let outcome = service.enroll("bob").await.unwrap();
        assert_eq!(outcome.embeddings_added, 0);

        let persons = service.list_persons().await.unwrap();
        assert_eq!(persons.len(), 1);
        assert!(persons[0].trained);
    }

    #[tokio::test]
    async fn test_enroll_undecodable_image_fails_with_decode_error() {
        let service = service_with(HashMap::new(), Config::default());
        service.create_person("bob").await.unwrap();
        service
            .add_images("bob", vec![("a.png".into(), b"not an image".to_vec())])
            .await
            .unwrap();

        let err = service.enroll("bob").await.unwrap_err();
        assert_eq!(err.code(), "IMAGE_DECODE_FAILED");
    }

    #[tokio::test]
    async fn test_enroll_policy_selects_face() {
        // One image with two faces: first is small, second is large.
        let observations = vec![
            observation(10.0, 0.9, vec![1.0, 0.0]),
            observation(50.0, 0.5, vec![0.0, 1.0]),
        ];
        let mut by_size = HashMap::new();
        by_size.insert((8, 8), observations);

        // Default policy keeps the first face.
        let service = service_with(by_size.clone(), Config::default());
        service.create_person("alice").await.unwrap();
        service
            .add_images("alice", vec![("a.png".into(), png(8, 8))])
            .await
            .unwrap();
        service.enroll("alice").await.unwrap();
        let known = service.faces().load_known().await.unwrap();
        assert_eq!(known[0].embedding.values(), &[1.0, 0.0]);

        // Largest keeps the second.
        let mut config = Config::default();
        config.recognition.face_policy = FacePolicy::Largest;
        let service = service_with(by_size, config);
        service.create_person("alice").await.unwrap();
        service
            .add_images("alice", vec![("a.png".into(), png(8, 8))])
            .await
            .unwrap();
        service.enroll("alice").await.unwrap();
        let known = service.faces().load_known().await.unwrap();
        assert_eq!(known[0].embedding.values(), &[0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_recognize_no_faces_yields_empty_list() {
        let service = service_with(HashMap::new(), Config::default());
        let outcome = service.recognize(png(5, 5), None).await.unwrap();
        assert!(outcome.faces.is_empty());
    }

    #[tokio::test]
    async fn test_recognize_invalid_bytes_fails_with_decode_error() {
        let service = service_with(HashMap::new(), Config::default());
        let err = service
            .recognize(b"junk".to_vec(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "IMAGE_DECODE_FAILED");
    }

    #[tokio::test]
    async fn test_recognize_empty_known_set_is_unknown() {
        let mut by_size = HashMap::new();
        by_size.insert((8, 8), vec![observation(10.0, 0.9, vec![1.0, 0.0])]);

        let service = service_with(by_size, Config::default());
        let outcome = service.recognize(png(8, 8), None).await.unwrap();
        assert_eq!(outcome.faces.len(), 1);
        assert_eq!(outcome.faces[0].label, UNKNOWN_LABEL);
        assert_eq!(outcome.faces[0].distance, None);
    }

    #[tokio::test]
    async fn test_recognize_labels_each_face_in_detection_order() {
        let mut by_size = HashMap::new();
        by_size.insert(
            (8, 8),
            vec![
                observation(10.0, 0.9, vec![0.9, 0.1]),
                observation(20.0, 0.8, vec![5.0, 5.0]),
            ],
        );

        let service = service_with(by_size, Config::default());
        service
            .faces()
            .record_enrollment("Alice", &[Embedding::new(vec![1.0, 0.0])])
            .await
            .unwrap();
        service
            .faces()
            .record_enrollment("Bob", &[Embedding::new(vec![0.0, 1.0])])
            .await
            .unwrap();

        let outcome = service.recognize(png(8, 8), Some(0.5)).await.unwrap();
        assert_eq!(outcome.faces.len(), 2);

        // First face is near Alice (distance ~0.141 < 0.5).
        assert_eq!(outcome.faces[0].label, "Alice");
        let distance = outcome.faces[0].distance.unwrap();
        assert!((distance - 0.1414).abs() < 1e-3);

        // Second face is far from everyone.
        assert_eq!(outcome.faces[1].label, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_recognize_threshold_is_strict_upper_bound() {
        let mut by_size = HashMap::new();
        by_size.insert((8, 8), vec![observation(10.0, 0.9, vec![0.5, 0.5])]);

        let service = service_with(by_size, Config::default());
        service
            .faces()
            .record_enrollment("Alice", &[Embedding::new(vec![1.0, 0.0])])
            .await
            .unwrap();
        service
            .faces()
            .record_enrollment("Bob", &[Embedding::new(vec![0.0, 1.0])])
            .await
            .unwrap();

        // Nearest distance is ~0.707, not strictly below 0.5.
        let outcome = service.recognize(png(8, 8), Some(0.5)).await.unwrap();
        assert_eq!(outcome.faces[0].label, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_add_images_to_unregistered_person_fails() {
        let service = service_with(HashMap::new(), Config::default());
        let err = service
            .add_images("ghost", vec![("a.png".into(), vec![1])])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERSON_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_person_removes_records() {
        let mut by_size = HashMap::new();
        by_size.insert((8, 8), vec![observation(10.0, 0.9, vec![1.0])]);

        let service = service_with(by_size, Config::default());
        service.create_person("alice").await.unwrap();
        service
            .add_images("alice", vec![("a.png".into(), png(8, 8))])
            .await
            .unwrap();
        service.enroll("alice").await.unwrap();
        assert_eq!(service.faces().count_records().await.unwrap(), 1);

        let removed = service.delete_person("alice").await.unwrap();
        assert_eq!(removed, 1);
        assert!(service.list_persons().await.unwrap().is_empty());
        assert_eq!(service.faces().count_records().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_persons_defaults_to_untrained() {
        let service = service_with(HashMap::new(), Config::default());
        service.create_person("alice").await.unwrap();

        let persons = service.list_persons().await.unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].name, "alice");
        assert!(!persons[0].trained);
    }
}
