//! Shared recognition service.
//!
//! Readers match against an immutable `Arc<Gallery>` snapshot. Every
//! mutation runs under a single writer lock: resolve against the current
//! snapshot, write to the store, then swap in a rebuilt snapshot. A failed
//! write leaves the previous snapshot serving.

use crate::detector::Detector;
use crate::enrollment::{self, EnrollmentOutcome, EnrollmentPlan};
use crate::error::SessionError;
use crate::frame::Frame;
use crate::import::{group_by_label, ImportItem, ImportReport};
use crate::matcher::Gallery;
use crate::recognition::{detect_faces, RecognitionSession};
use crate::store::{EmbeddingStore, StoreError};
use crate::types::{LabeledIdentity, MatchResult};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Label and embedding count of one enrolled identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub label: String,
    pub embeddings: usize,
}

pub struct FaceService {
    detector: Arc<dyn Detector>,
    store: Arc<dyn EmbeddingStore>,
    gallery: RwLock<Arc<Gallery>>,
    writer: Mutex<()>,
    threshold: f32,
}

impl FaceService {
    /// Load every identity from `store` and build the first snapshot.
    ///
    /// Fails if the store cannot be read; callers must not serve requests
    /// without a gallery.
    pub async fn open(
        detector: Arc<dyn Detector>,
        store: Arc<dyn EmbeddingStore>,
        threshold: f32,
    ) -> Result<Self, StoreError> {
        let identities = checked_labels(store.load_all().await?)?;
        let gallery = Gallery::new(identities, threshold);
        tracing::info!(
            identities = gallery.identities().len(),
            embeddings = gallery.embedding_count(),
            threshold,
            "gallery loaded"
        );

        Ok(Self {
            detector,
            store,
            gallery: RwLock::new(Arc::new(gallery)),
            writer: Mutex::new(()),
            threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Current gallery snapshot.
    pub fn snapshot(&self) -> Arc<Gallery> {
        match self.gallery.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn swap(&self, next: Gallery) {
        let next = Arc::new(next);
        match self.gallery.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn identities(&self) -> Vec<IdentitySummary> {
        self.snapshot()
            .identities()
            .iter()
            .map(|i| IdentitySummary {
                label: i.label.clone(),
                embeddings: i.embeddings.len(),
            })
            .collect()
    }

    /// Labels of every face in `frame`, in detector order.
    pub async fn recognize(&self, frame: &Frame) -> Result<Vec<String>, SessionError> {
        let results = self.recognize_detailed(frame).await?;
        Ok(results.into_iter().map(|r| r.label).collect())
    }

    pub async fn recognize_detailed(&self, frame: &Frame) -> Result<Vec<MatchResult>, SessionError> {
        let gallery = self.snapshot();
        let session = RecognitionSession::new(self.detector.as_ref(), gallery.as_ref());
        let results = session.run(frame).await?;
        if !results.is_empty() {
            tracing::info!(
                labels = ?results.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
                "recognized faces"
            );
        }
        Ok(results)
    }

    /// Register the single face in `frame`.
    ///
    /// A face that matches an enrolled identity extends that identity and
    /// `claimed_name` is ignored; otherwise a new identity is created under
    /// `claimed_name`.
    pub async fn enroll(
        &self,
        frame: &Frame,
        claimed_name: &str,
    ) -> Result<EnrollmentOutcome, SessionError> {
        let claimed = enrollment::validate_label(claimed_name)?;

        let faces = detect_faces(self.detector.as_ref(), frame).await?;
        let face = match enrollment::single_face(faces) {
            Ok(face) => face,
            Err(outcome) => {
                tracing::info!(claimed = %claimed, outcome = ?outcome, "enrollment rejected");
                return Ok(outcome);
            }
        };

        let _write = self.writer.lock().await;
        let gallery = self.snapshot();
        let plan = enrollment::resolve(&gallery, &claimed, face.embedding)?;

        let next = match &plan {
            EnrollmentPlan::Extend { label, embedding } => {
                self.store.append(label, embedding).await?;
                gallery.with_appended(label, embedding.clone())
            }
            EnrollmentPlan::Create { label, embedding } => {
                self.store
                    .create(label, std::slice::from_ref(embedding))
                    .await?;
                gallery.with_created(LabeledIdentity::new(label.clone(), vec![embedding.clone()]))
            }
        };
        self.swap(next);

        let outcome = plan.outcome();
        tracing::info!(outcome = ?outcome, "enrollment stored");
        Ok(outcome)
    }

    /// Seed identities from labeled frames.
    ///
    /// Per-frame problems are collected in the report; a store failure
    /// aborts the import. Identities created before the failure stay
    /// enrolled.
    pub async fn import(&self, items: Vec<ImportItem>) -> Result<ImportReport, SessionError> {
        let mut report = ImportReport::default();

        for (label, group) in group_by_label(items) {
            let label = match enrollment::validate_label(&label) {
                Ok(label) => label,
                Err(err) => {
                    report.failed.push((label, err.to_string()));
                    continue;
                }
            };

            if self.snapshot().contains(&label) {
                tracing::info!(label = %label, "already enrolled, skipping import");
                report.skipped.push(label);
                continue;
            }

            let mut embeddings = Vec::with_capacity(group.len());
            for item in group {
                let faces = match detect_faces(self.detector.as_ref(), &item.frame).await {
                    Ok(faces) => faces,
                    Err(err) => {
                        tracing::warn!(source = %item.source, error = %err, "import frame rejected");
                        report.failed.push((item.source, err.to_string()));
                        continue;
                    }
                };
                match enrollment::single_face(faces) {
                    Ok(face) => embeddings.push(face.embedding),
                    Err(outcome) => {
                        tracing::warn!(source = %item.source, outcome = ?outcome, "import frame rejected");
                        report.failed.push((item.source, outcome.message()));
                    }
                }
            }

            if embeddings.is_empty() {
                report
                    .failed
                    .push((label, "no usable face in any image".to_string()));
                continue;
            }

            let _write = self.writer.lock().await;
            let gallery = self.snapshot();
            if gallery.contains(&label) {
                report.skipped.push(label);
                continue;
            }
            match self.store.create(&label, &embeddings).await {
                Ok(()) => {}
                Err(StoreError::LabelExists(_)) => {
                    tracing::info!(label = %label, "label already in store, skipping import");
                    report.skipped.push(label);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
            let count = embeddings.len();
            self.swap(gallery.with_created(LabeledIdentity::new(label.clone(), embeddings)));

            tracing::info!(label = %label, embeddings = count, "identity imported");
            report.created.push((label, count));
        }

        Ok(report)
    }

    /// Rebuild the snapshot from the store.
    ///
    /// On failure the previous snapshot keeps serving.
    pub async fn reload(&self) -> Result<usize, SessionError> {
        let _write = self.writer.lock().await;
        let identities = match self.store.load_all().await.and_then(checked_labels) {
            Ok(identities) => identities,
            Err(err) => {
                tracing::warn!(error = %err, "gallery reload failed; keeping previous snapshot");
                return Err(err.into());
            }
        };
        let gallery = Gallery::new(identities, self.threshold);
        let count = gallery.identities().len();
        self.swap(gallery);
        tracing::info!(identities = count, "gallery reloaded");
        Ok(count)
    }
}

/// Reject stored identities whose label could not have been enrolled.
///
/// A stored `unknown` label would match faces that then read as unmatched.
fn checked_labels(identities: Vec<LabeledIdentity>) -> Result<Vec<LabeledIdentity>, StoreError> {
    if let Some(bad) = identities
        .iter()
        .find(|i| !matches!(enrollment::validate_label(&i.label), Ok(label) if label == i.label))
    {
        return Err(StoreError::ReservedLabel(bad.label.clone()));
    }
    Ok(identities)
}
