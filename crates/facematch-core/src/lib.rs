//! facematch-core — Face gallery matching and enrollment.
//!
//! Matches detected face embeddings against a gallery of enrolled
//! identities by Euclidean nearest neighbour, and decides whether an
//! enrollment creates a new identity or extends an existing one. Face
//! detection and persistence are reached through the [`Detector`] and
//! [`EmbeddingStore`] traits.

pub mod detector;
pub mod enrollment;
pub mod error;
pub mod frame;
pub mod import;
pub mod matcher;
pub mod recognition;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use detector::{DetectError, Detector};
pub use enrollment::EnrollmentOutcome;
pub use error::SessionError;
pub use frame::{encode_data_url, Frame, FrameError, BLANK_DATA_URL};
pub use import::{scan_labels_dir, ImportItem, ImportReport, ImportScan, DEFAULT_IMAGES_PER_LABEL};
pub use matcher::{Gallery, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use recognition::RecognitionSession;
pub use service::{FaceService, IdentitySummary};
pub use store::{EmbeddingStore, MemoryStore, StoreError};
pub use types::{
    BoundingBox, Embedding, EmbeddingError, FaceObservation, LabeledIdentity, MatchResult,
    EMBEDDING_DIM, UNKNOWN_LABEL,
};
