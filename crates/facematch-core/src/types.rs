use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Dimensionality of every face embedding handled by facematch.
pub const EMBEDDING_DIM: usize = 128;

/// Label reported when no enrolled identity is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("expected {expected}-dim embedding, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("embedding component {index} is not finite")]
    NonFinite { index: usize },
    #[error("malformed embedding: {0}")]
    Malformed(String),
}

/// Bounding box of a detected face, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point landmarks: left eye, right eye, nose, left and right
    /// mouth corners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding: a fixed 128-dimensional feature vector.
///
/// Serialized as an ordered list of floats. Every conversion from untyped
/// data checks the length and rejects non-finite components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Box<[f32; EMBEDDING_DIM]>);

impl Embedding {
    pub fn new(values: [f32; EMBEDDING_DIM]) -> Self {
        Self(Box::new(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice()
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<&[f32]> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: &[f32]) -> Result<Self, Self::Error> {
        let array: [f32; EMBEDDING_DIM] =
            values.try_into().map_err(|_| EmbeddingError::WrongDimension {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            })?;
        if let Some(index) = array.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite { index });
        }
        Ok(Self::new(array))
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::try_from(values.as_slice())
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0.to_vec()
    }
}

/// One face found in a frame by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    pub embedding: Embedding,
    pub region: BoundingBox,
}

/// An enrolled identity: its label and every embedding stored under it,
/// in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledIdentity {
    pub label: String,
    pub embeddings: Vec<Embedding>,
}

impl LabeledIdentity {
    pub fn new(label: impl Into<String>, embeddings: Vec<Embedding>) -> Self {
        Self {
            label: label.into(),
            embeddings,
        }
    }
}

/// Outcome of matching one query embedding against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Matched label, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Euclidean distance to the nearest stored vector (`+inf` on an empty gallery).
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.label, self.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(value: f32) -> Embedding {
        let mut values = [0.0f32; EMBEDDING_DIM];
        values[0] = value;
        Embedding::new(values)
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = axis(0.3);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let mut values = [0.0f32; EMBEDDING_DIM];
        values[0] = 3.0;
        values[1] = 4.0;
        let a = Embedding::new(values);
        let b = axis(0.0);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_try_from_rejects_wrong_length() {
        let err = Embedding::try_from(vec![0.0f32; 127]).unwrap_err();
        assert_eq!(
            err,
            EmbeddingError::WrongDimension {
                expected: EMBEDDING_DIM,
                actual: 127
            }
        );
    }

    #[test]
    fn test_try_from_rejects_nan() {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[7] = f32::NAN;
        assert_eq!(
            Embedding::try_from(values).unwrap_err(),
            EmbeddingError::NonFinite { index: 7 }
        );
    }

    #[test]
    fn test_serializes_as_float_list() {
        let json = serde_json::to_string(&axis(1.5)).unwrap();
        assert!(json.starts_with("[1.5,0.0,"));
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, axis(1.5));
    }

    #[test]
    fn test_deserialize_short_list_fails() {
        let result: Result<Embedding, _> = serde_json::from_str("[0.1, 0.2, 0.3]");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_match_result() {
        let result = MatchResult::unknown(f32::INFINITY);
        assert!(result.is_unknown());
        assert_eq!(result.label, "unknown");
    }
}
