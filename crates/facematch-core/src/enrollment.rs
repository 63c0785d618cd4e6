//! Enrollment decisions: single-face precondition and merge-vs-create.
//!
//! The face, not the caller's string, is the primary key of an identity.
//! A face that matches an enrolled identity extends it under its original
//! label; only an unmatched face creates a new identity under the supplied
//! name.

use crate::error::SessionError;
use crate::matcher::{Gallery, Matcher};
use crate::types::{Embedding, FaceObservation, UNKNOWN_LABEL};
use serde::Serialize;

/// Result of an enrollment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "label", rename_all = "snake_case")]
pub enum EnrollmentOutcome {
    /// A new identity was created under the supplied name.
    IdentityCreated(String),
    /// The face matched this existing identity; one embedding was appended.
    IdentityExtended(String),
    NoFaceDetected,
    MultipleFacesDetected,
}

impl EnrollmentOutcome {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::IdentityCreated(label) | Self::IdentityExtended(label) => Some(label),
            Self::NoFaceDetected | Self::MultipleFacesDetected => None,
        }
    }

    /// Human-readable message for clients.
    pub fn message(&self) -> String {
        match self {
            Self::IdentityCreated(label) => format!("new identity `{label}` created"),
            Self::IdentityExtended(label) => format!("`{label}` updated"),
            Self::NoFaceDetected => "there is no face in the frame".into(),
            Self::MultipleFacesDetected => "make sure only one person is in the frame".into(),
        }
    }
}

/// Store mutation chosen for a single detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentPlan {
    Extend { label: String, embedding: Embedding },
    Create { label: String, embedding: Embedding },
}

impl EnrollmentPlan {
    pub fn outcome(&self) -> EnrollmentOutcome {
        match self {
            Self::Extend { label, .. } => EnrollmentOutcome::IdentityExtended(label.clone()),
            Self::Create { label, .. } => EnrollmentOutcome::IdentityCreated(label.clone()),
        }
    }
}

/// Normalise a caller-supplied name into a label.
pub fn validate_label(name: &str) -> Result<String, SessionError> {
    let label = name.trim();
    if label.is_empty() {
        return Err(SessionError::InvalidLabel("name must not be empty".into()));
    }
    if label == UNKNOWN_LABEL {
        return Err(SessionError::InvalidLabel(format!(
            "`{UNKNOWN_LABEL}` is reserved for unmatched faces"
        )));
    }
    Ok(label.to_string())
}

/// Enforce the exactly-one-face precondition.
pub fn single_face(mut faces: Vec<FaceObservation>) -> Result<FaceObservation, EnrollmentOutcome> {
    match faces.len() {
        0 => Err(EnrollmentOutcome::NoFaceDetected),
        1 => Ok(faces.remove(0)),
        _ => Err(EnrollmentOutcome::MultipleFacesDetected),
    }
}

/// Decide how to enroll `embedding` claimed as `claimed` against `gallery`.
///
/// Must run against the gallery the resulting write will be applied to.
pub fn resolve(
    gallery: &Gallery,
    claimed: &str,
    embedding: Embedding,
) -> Result<EnrollmentPlan, SessionError> {
    let best = gallery.find_best_match(&embedding);

    if !best.is_unknown() {
        if best.label != claimed {
            tracing::info!(
                label = %best.label,
                claimed,
                distance = best.distance,
                "face belongs to an enrolled identity; supplied name discarded"
            );
        }
        return Ok(EnrollmentPlan::Extend {
            label: best.label,
            embedding,
        });
    }

    if gallery.contains(claimed) {
        return Err(SessionError::LabelTaken(claimed.to_string()));
    }

    Ok(EnrollmentPlan::Create {
        label: claimed.to_string(),
        embedding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{axis, face};
    use crate::types::LabeledIdentity;

    fn bob_gallery() -> Gallery {
        Gallery::new(vec![LabeledIdentity::new("bob", vec![axis(0.0)])], 0.6)
    }

    #[test]
    fn test_validate_label_trims() {
        assert_eq!(validate_label("  carol ").unwrap(), "carol");
    }

    #[test]
    fn test_validate_label_rejects_empty_and_reserved() {
        assert!(matches!(validate_label("   "), Err(SessionError::InvalidLabel(_))));
        assert!(matches!(validate_label("unknown"), Err(SessionError::InvalidLabel(_))));
    }

    #[test]
    fn test_single_face_cardinality() {
        assert_eq!(single_face(vec![]).unwrap_err(), EnrollmentOutcome::NoFaceDetected);
        assert_eq!(
            single_face(vec![face(0.0), face(1.0)]).unwrap_err(),
            EnrollmentOutcome::MultipleFacesDetected
        );
        assert_eq!(single_face(vec![face(0.3)]).unwrap(), face(0.3));
    }

    #[test]
    fn test_resolve_new_face_creates_under_claimed_name() {
        let plan = resolve(&Gallery::empty(0.6), "bob", axis(0.0)).unwrap();
        assert_eq!(
            plan,
            EnrollmentPlan::Create {
                label: "bob".into(),
                embedding: axis(0.0)
            }
        );
        assert_eq!(plan.outcome(), EnrollmentOutcome::IdentityCreated("bob".into()));
    }

    #[test]
    fn test_resolve_returning_face_keeps_original_label() {
        let plan = resolve(&bob_gallery(), "robert", axis(0.1)).unwrap();
        assert_eq!(plan.outcome(), EnrollmentOutcome::IdentityExtended("bob".into()));
    }

    #[test]
    fn test_resolve_taken_name_with_new_face_is_rejected() {
        let err = resolve(&bob_gallery(), "bob", axis(3.0)).unwrap_err();
        assert!(matches!(err, SessionError::LabelTaken(l) if l == "bob"));
    }

    #[test]
    fn test_outcome_serialization() {
        let created = serde_json::to_value(EnrollmentOutcome::IdentityCreated("bob".into())).unwrap();
        assert_eq!(created, serde_json::json!({"outcome": "identity_created", "label": "bob"}));

        let none = serde_json::to_value(EnrollmentOutcome::NoFaceDetected).unwrap();
        assert_eq!(none, serde_json::json!({"outcome": "no_face_detected"}));
    }

    #[test]
    fn test_outcome_label_and_message() {
        let extended = EnrollmentOutcome::IdentityExtended("bob".into());
        assert_eq!(extended.label(), Some("bob"));
        assert!(extended.message().contains("bob"));
        assert_eq!(EnrollmentOutcome::MultipleFacesDetected.label(), None);
    }
}
