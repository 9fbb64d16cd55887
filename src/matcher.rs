//! Nearest-neighbor matching of face embeddings.
//!
//! One query embedding is compared against every enrolled record by
//! Euclidean distance; the closest record wins, and only when its
//! distance is strictly below the caller's threshold.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::math::euclidean_distance;

/// Fixed-length face feature vector.
///
/// Produced only by the extractor backend and never mutated afterwards.
/// All embeddings being compared must share one dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Serialize as contiguous little-endian f32 bytes for storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from little-endian f32 bytes, rejecting blobs whose
    /// length is not a whole number of values.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(Error::CorruptEmbedding(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap();
                f32::from_le_bytes(arr)
            })
            .collect();
        Ok(Self(values))
    }
}

/// One enrolled record: a person name paired with one embedding.
///
/// A person enrolled from several reference images owns several records
/// under the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFace {
    pub name: String,
    pub embedding: Embedding,
}

/// Outcome of matching one query embedding against the known set.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The closest record landed strictly below the threshold.
    Identified { name: String, distance: f32 },
    /// Empty known set, or no record close enough.
    Unknown,
}

/// Find the closest enrolled record by Euclidean distance.
///
/// Ties on the minimum distance resolve to the first record in
/// iteration order, so results are deterministic for a given record
/// order. Fails fast when any record disagrees with the query on
/// dimensionality.
pub fn find_best(query: &Embedding, known: &[KnownFace], threshold: f32) -> Result<MatchOutcome> {
    let mut best: Option<(usize, f32)> = None;

    for (idx, record) in known.iter().enumerate() {
        if record.embedding.dim() != query.dim() {
            return Err(Error::DimensionMismatch {
                query: query.dim(),
                stored: record.embedding.dim(),
            });
        }
        let distance = euclidean_distance(query.values(), record.embedding.values());
        match best {
            Some((_, best_distance)) if best_distance <= distance => {}
            _ => best = Some((idx, distance)),
        }
    }

    match best {
        Some((idx, distance)) if distance < threshold => Ok(MatchOutcome::Identified {
            name: known[idx].name.clone(),
            distance,
        }),
        _ => Ok(MatchOutcome::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: Vec<f32>) -> KnownFace {
        KnownFace {
            name: name.to_string(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_exact_match_has_zero_distance() {
        let query = Embedding::new(vec![0.25, -1.5, 3.0]);
        let known = vec![record("A", vec![0.25, -1.5, 3.0])];

        match find_best(&query, &known, 0.01).unwrap() {
            MatchOutcome::Identified { name, distance } => {
                assert_eq!(name, "A");
                assert_eq!(distance, 0.0);
            }
            MatchOutcome::Unknown => panic!("expected a match"),
        }
    }

    #[test]
    fn test_empty_known_set_is_unknown() {
        let query = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(find_best(&query, &[], 1000.0).unwrap(), MatchOutcome::Unknown);
    }

    #[test]
    fn test_nearest_under_threshold_matches() {
        let known = vec![
            record("Alice", vec![1.0, 0.0]),
            record("Bob", vec![0.0, 1.0]),
        ];
        let query = Embedding::new(vec![0.9, 0.1]);

        match find_best(&query, &known, 0.5).unwrap() {
            MatchOutcome::Identified { name, distance } => {
                assert_eq!(name, "Alice");
                assert!((distance - 0.1414).abs() < 1e-3);
            }
            MatchOutcome::Unknown => panic!("expected Alice"),
        }
    }

    #[test]
    fn test_nearest_at_or_over_threshold_is_unknown() {
        let known = vec![
            record("Alice", vec![1.0, 0.0]),
            record("Bob", vec![0.0, 1.0]),
        ];
        // Equidistant from both at ~0.707, over the 0.5 threshold.
        let query = Embedding::new(vec![0.5, 0.5]);
        assert_eq!(find_best(&query, &known, 0.5).unwrap(), MatchOutcome::Unknown);

        // Strictly-below semantics: a distance equal to the threshold
        // does not match.
        let query = Embedding::new(vec![0.0, 0.0]);
        let known = vec![record("A", vec![1.0, 0.0])];
        assert_eq!(find_best(&query, &known, 1.0).unwrap(), MatchOutcome::Unknown);
    }

    #[test]
    fn test_raising_threshold_preserves_match() {
        let known = vec![
            record("Alice", vec![1.0, 0.0]),
            record("Bob", vec![0.0, 1.0]),
        ];
        let query = Embedding::new(vec![0.9, 0.1]);

        let tight = find_best(&query, &known, 0.2).unwrap();
        let loose = find_best(&query, &known, 5.0).unwrap();
        assert_eq!(tight, loose);
    }

    #[test]
    fn test_tie_breaks_to_first_record() {
        let known = vec![
            record("First", vec![1.0, 0.0]),
            record("Second", vec![-1.0, 0.0]),
        ];
        let query = Embedding::new(vec![0.0, 0.0]);

        match find_best(&query, &known, 2.0).unwrap() {
            MatchOutcome::Identified { name, .. } => assert_eq!(name, "First"),
            MatchOutcome::Unknown => panic!("expected a match"),
        }
    }

    #[test]
    fn test_dimension_mismatch_fails_fast() {
        let known = vec![record("A", vec![1.0, 0.0, 0.0])];
        let query = Embedding::new(vec![1.0, 0.0]);

        let err = find_best(&query, &known, 1.0).unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }

    #[test]
    fn test_byte_codec() {
        let original = Embedding::new(vec![1.5, -2.25, 0.0, 42.0]);
        let restored = Embedding::from_le_bytes(&original.to_le_bytes()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let err = Embedding::from_le_bytes(&[0u8; 7]).unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }
}
