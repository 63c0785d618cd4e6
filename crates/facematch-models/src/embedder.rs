//! 128-d face descriptor extraction via ONNX Runtime.
//!
//! Expects a ResNet face descriptor model exported to ONNX taking a
//! landmark-aligned 150×150 RGB chip scaled to [0, 1]. Its descriptors are
//! compared with Euclidean distance; 0.6 is the conventional same-person
//! cut-off for aligned chips.

use crate::alignment::{self, REFERENCE_LANDMARKS_150};
use facematch_core::{BoundingBox, Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBEDDER_INPUT_SIZE: u32 = 150;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detected face has no landmarks")]
    NoLandmarks,
    #[error("degenerate face landmarks")]
    DegenerateLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded face descriptor model");
        Ok(Self { session })
    }

    /// Extract the descriptor of `face`, aligned on its landmarks.
    pub fn extract(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EmbedderError> {
        let chip = face_chip(image, face)?;
        let input = preprocess(&chip);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("descriptor output: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }
        Embedding::try_from(raw).map_err(|e| EmbedderError::InferenceFailed(e.to_string()))
    }
}

/// The 150×150 aligned chip of `face`.
fn face_chip(image: &RgbImage, face: &BoundingBox) -> Result<RgbImage, EmbedderError> {
    let landmarks = face.landmarks.as_ref().ok_or(EmbedderError::NoLandmarks)?;
    alignment::align_face(image, landmarks, &REFERENCE_LANDMARKS_150, EMBEDDER_INPUT_SIZE)
        .ok_or(EmbedderError::DegenerateLandmarks)
}

fn preprocess(chip: &RgbImage) -> Array4<f32> {
    let side = EMBEDDER_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in chip.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32 / 255.0;
        }
    }
    tensor
}
