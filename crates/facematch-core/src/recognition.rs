//! Per-frame recognition: detect every face, label each one.

use crate::detector::Detector;
use crate::error::SessionError;
use crate::frame::Frame;
use crate::matcher::Matcher;
use crate::types::{FaceObservation, MatchResult};

/// Run the detector over `frame`.
///
/// A blank frame yields no observations and never reaches the detector.
pub async fn detect_faces(
    detector: &dyn Detector,
    frame: &Frame,
) -> Result<Vec<FaceObservation>, SessionError> {
    if frame.is_blank() {
        tracing::debug!("blank frame, skipping detection");
        return Ok(Vec::new());
    }

    let faces = detector.detect(frame).await?;
    tracing::debug!(faces = faces.len(), "detection complete");
    Ok(faces)
}

/// One recognition request against a fixed matcher snapshot.
pub struct RecognitionSession<'a> {
    detector: &'a dyn Detector,
    matcher: &'a dyn Matcher,
}

impl<'a> RecognitionSession<'a> {
    pub fn new(detector: &'a dyn Detector, matcher: &'a dyn Matcher) -> Self {
        Self { detector, matcher }
    }

    /// Label every face in `frame`, in detector order.
    ///
    /// The result has exactly one entry per detected face; unmatched faces
    /// carry the `unknown` label.
    pub async fn run(&self, frame: &Frame) -> Result<Vec<MatchResult>, SessionError> {
        let faces = detect_faces(self.detector, frame).await?;

        let results: Vec<MatchResult> = faces
            .iter()
            .map(|face| self.matcher.find_best_match(&face.embedding))
            .collect();

        for (face, result) in faces.iter().zip(&results) {
            tracing::debug!(
                label = %result.label,
                distance = result.distance,
                confidence = face.region.confidence,
                "face matched"
            );
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectError;
    use crate::matcher::Gallery;
    use crate::testing::{axis, ScriptedDetector};
    use crate::types::LabeledIdentity;

    fn alice_gallery() -> Gallery {
        Gallery::new(vec![LabeledIdentity::new("alice", vec![axis(0.0)])], 0.6)
    }

    #[tokio::test]
    async fn test_recognize_known_face() {
        let detector = ScriptedDetector::new().with_faces(b"one", &[0.0]);
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let results = session.run(&Frame::from_bytes(b"one".to_vec())).await.unwrap();
        let labels: Vec<_> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["alice"]);
    }

    #[tokio::test]
    async fn test_recognize_far_face_is_unknown() {
        let detector = ScriptedDetector::new().with_faces(b"far", &[2.0]);
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let results = session.run(&Frame::from_bytes(b"far".to_vec())).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_unknown());
    }

    #[tokio::test]
    async fn test_one_label_per_face_in_detector_order() {
        let detector = ScriptedDetector::new().with_faces(b"crowd", &[5.0, 0.0, 0.1]);
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let results = session.run(&Frame::from_bytes(b"crowd".to_vec())).await.unwrap();
        let labels: Vec<_> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["unknown", "alice", "alice"]);
    }

    #[tokio::test]
    async fn test_blank_frame_skips_detector() {
        let detector = ScriptedDetector::new();
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let results = session.run(&Frame::blank()).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_faces_is_empty_result() {
        let detector = ScriptedDetector::new().with_faces(b"empty room", &[]);
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let results = session
            .run(&Frame::from_bytes(b"empty room".to_vec()))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(detector.calls(), 1);
    }

    #[tokio::test]
    async fn test_detector_failure_surfaces() {
        let detector = ScriptedDetector::new()
            .with_error(b"boom", DetectError::Failure("model crashed".into()));
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let err = session
            .run(&Frame::from_bytes(b"boom".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::DetectorFailure(m) if m == "model crashed"));
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_invalid() {
        let detector = ScriptedDetector::new();
        let gallery = alice_gallery();
        let session = RecognitionSession::new(&detector, &gallery);

        let err = session
            .run(&Frame::from_bytes(b"not an image".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidFrame(_)));
    }
}
