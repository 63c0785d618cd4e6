//! Frame → face observations: decode, detect, extract one descriptor per face.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use facematch_core::{DetectError, FaceObservation, Frame, FrameError};
use std::path::Path;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const EMBEDDER_MODEL_FILE: &str = "face_descriptor_128.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
}

impl From<PipelineError> for DetectError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Frame(e) => DetectError::InvalidFrame(e.to_string()),
            other => DetectError::Failure(other.to_string()),
        }
    }
}

/// Both ONNX models, loaded once and used from a single thread.
pub struct FacePipeline {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl FacePipeline {
    /// Load [`DETECTOR_MODEL_FILE`] and [`EMBEDDER_MODEL_FILE`] from `model_dir`.
    pub fn load(model_dir: &Path, detection_confidence: f32) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE), detection_confidence)?;
        let embedder = FaceEmbedder::load(&model_dir.join(EMBEDDER_MODEL_FILE))?;
        Ok(Self { detector, embedder })
    }

    /// Every face in `frame`, most confident first, each with its descriptor.
    pub fn process(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, PipelineError> {
        let image = frame.decode()?;
        let faces = self.detector.detect(&image)?;

        faces
            .into_iter()
            .map(|region| -> Result<FaceObservation, PipelineError> {
                let embedding = self.embedder.extract(&image, &region)?;
                Ok(FaceObservation { embedding, region })
            })
            .collect()
    }
}
