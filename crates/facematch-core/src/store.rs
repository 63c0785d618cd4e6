//! Embedding persistence contract and an in-memory implementation.

use crate::types::{Embedding, EmbeddingError, LabeledIdentity};
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("embedding store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt embedding stored under `{label}`: {source}")]
    CorruptEmbedding {
        label: String,
        #[source]
        source: EmbeddingError,
    },
    #[error("label `{0}` already exists")]
    LabelExists(String),
    #[error("label `{0}` is not enrolled")]
    UnknownLabel(String),
    #[error("identity `{0}` must have at least one embedding")]
    EmptyIdentity(String),
    #[error("stored label `{0}` is reserved or malformed")]
    ReservedLabel(String),
    #[error("cannot encode embedding for `{label}`: {reason}")]
    Encoding { label: String, reason: String },
}

/// Backing store of labeled embeddings.
///
/// `load_all` returns identities in first-enrollment order; that order is
/// the tie-break order of the matcher.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<LabeledIdentity>, StoreError>;

    /// Append one embedding to an existing label.
    async fn append(&self, label: &str, embedding: &Embedding) -> Result<(), StoreError>;

    /// Create a new label holding `embeddings` (non-empty).
    async fn create(&self, label: &str, embeddings: &[Embedding]) -> Result<(), StoreError>;

    async fn find(&self, label: &str) -> Result<Option<LabeledIdentity>, StoreError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Mutex<Vec<LabeledIdentity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities(identities: Vec<LabeledIdentity>) -> Self {
        Self {
            identities: Mutex::new(identities),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<LabeledIdentity>>, StoreError> {
        self.identities
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<LabeledIdentity>, StoreError> {
        Ok(self.lock()?.clone())
    }

    async fn append(&self, label: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let mut identities = self.lock()?;
        let identity = identities
            .iter_mut()
            .find(|i| i.label == label)
            .ok_or_else(|| StoreError::UnknownLabel(label.to_string()))?;
        identity.embeddings.push(embedding.clone());
        Ok(())
    }

    async fn create(&self, label: &str, embeddings: &[Embedding]) -> Result<(), StoreError> {
        if embeddings.is_empty() {
            return Err(StoreError::EmptyIdentity(label.to_string()));
        }
        let mut identities = self.lock()?;
        if identities.iter().any(|i| i.label == label) {
            return Err(StoreError::LabelExists(label.to_string()));
        }
        identities.push(LabeledIdentity::new(label, embeddings.to_vec()));
        Ok(())
    }

    async fn find(&self, label: &str) -> Result<Option<LabeledIdentity>, StoreError> {
        Ok(self.lock()?.iter().find(|i| i.label == label).cloned())
    }
}
