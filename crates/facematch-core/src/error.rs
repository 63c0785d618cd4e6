use crate::detector::DetectError;
use crate::frame::FrameError;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single recognition, enrollment or import request.
///
/// "No face" and "several faces" are not errors; they are
/// [`EnrollmentOutcome`](crate::EnrollmentOutcome) variants.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("detector failure: {0}")]
    DetectorFailure(String),
    #[error("detector timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store rejected write: {0}")]
    StoreRejected(String),
    #[error("corrupt embedding: {0}")]
    CorruptEmbedding(String),
    #[error("invalid label: {0}")]
    InvalidLabel(String),
    #[error("label `{0}` is already enrolled to a different face")]
    LabelTaken(String),
}

impl From<DetectError> for SessionError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::InvalidFrame(msg) => SessionError::InvalidFrame(msg),
            DetectError::Failure(msg) => SessionError::DetectorFailure(msg),
            DetectError::Timeout(after) => SessionError::Timeout(after),
        }
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        SessionError::InvalidFrame(err.to_string())
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => SessionError::StoreUnavailable(msg),
            StoreError::CorruptEmbedding { .. } | StoreError::ReservedLabel(_) => {
                SessionError::CorruptEmbedding(err.to_string())
            }
            StoreError::LabelExists(label) => SessionError::LabelTaken(label),
            StoreError::UnknownLabel(_)
            | StoreError::EmptyIdentity(_)
            | StoreError::Encoding { .. } => {
                SessionError::StoreRejected(err.to_string())
            }
        }
    }
}
