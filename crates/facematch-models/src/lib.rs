//! facematch-models — ONNX face pipeline.
//!
//! SCRFD locates faces and their five landmarks; each face is aligned on
//! its landmarks and a ResNet descriptor model turns the aligned chip
//! into a 128-d embedding. Both run on the CPU via ONNX Runtime.

pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod pipeline;

pub use pipeline::{FacePipeline, PipelineError, DETECTOR_MODEL_FILE, EMBEDDER_MODEL_FILE};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch/models")
}
