//! Test doubles shared by the unit tests of this crate.

use crate::detector::{DetectError, Detector};
use crate::frame::Frame;
use crate::store::{EmbeddingStore, StoreError};
use crate::types::{BoundingBox, Embedding, FaceObservation, LabeledIdentity, EMBEDDING_DIM};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Embedding with `value` on the first axis and zeros elsewhere, so the
/// distance between two of them is the difference of their values.
pub fn axis(value: f32) -> Embedding {
    let mut values = [0.0f32; EMBEDDING_DIM];
    values[0] = value;
    Embedding::new(values)
}

pub fn face(value: f32) -> FaceObservation {
    FaceObservation {
        embedding: axis(value),
        region: BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 64.0,
            height: 64.0,
            confidence: 0.9,
            landmarks: None,
        },
    }
}

/// Detector that answers from a table keyed by frame bytes.
///
/// Unscripted frames are reported as undecodable.
#[derive(Default)]
pub struct ScriptedDetector {
    responses: HashMap<Vec<u8>, Result<Vec<FaceObservation>, DetectError>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(mut self, frame: &[u8], values: &[f32]) -> Self {
        let faces = values.iter().map(|&v| face(v)).collect();
        self.responses.insert(frame.to_vec(), Ok(faces));
        self
    }

    pub fn with_error(mut self, frame: &[u8], err: DetectError) -> Self {
        self.responses.insert(frame.to_vec(), Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceObservation>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(frame.as_bytes())
            .cloned()
            .unwrap_or_else(|| Err(DetectError::InvalidFrame("unrecognised image data".into())))
    }
}

/// Wraps another store and fails every call while switched off.
pub struct FlakyStore<S> {
    inner: S,
    online: AtomicBool,
}

impl<S: EmbeddingStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }
}

#[async_trait]
impl<S: EmbeddingStore> EmbeddingStore for FlakyStore<S> {
    async fn load_all(&self) -> Result<Vec<LabeledIdentity>, StoreError> {
        self.check()?;
        self.inner.load_all().await
    }

    async fn append(&self, label: &str, embedding: &Embedding) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append(label, embedding).await
    }

    async fn create(&self, label: &str, embeddings: &[Embedding]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.create(label, embeddings).await
    }

    async fn find(&self, label: &str) -> Result<Option<LabeledIdentity>, StoreError> {
        self.check()?;
        self.inner.find(label).await
    }
}
