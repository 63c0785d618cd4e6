//! Face detector contract.
//!
//! The detector owns image decoding, face localisation and embedding
//! extraction. The core only sees the observations it returns.

use crate::frame::Frame;
use crate::types::FaceObservation;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("detector failure: {0}")]
    Failure(String),
    #[error("detector timed out after {0:?}")]
    Timeout(Duration),
}

/// Finds every face in a frame and extracts one embedding per face.
///
/// Observations are returned in the detector's own order; callers must not
/// reorder them.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceObservation>, DetectError>;
}
