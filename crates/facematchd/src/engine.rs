use async_trait::async_trait;
use facematch_core::{DetectError, Detector, FaceObservation, Frame};
use facematch_models::{FacePipeline, PipelineError};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Requests queued ahead of the engine thread before senders wait.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One frame sent from a request handler to the engine thread.
struct DetectRequest {
    frame: Frame,
    reply: oneshot::Sender<Result<Vec<FaceObservation>, PipelineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<DetectRequest>,
    timeout: Duration,
}

#[async_trait]
impl Detector for EngineHandle {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceObservation>, DetectError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DetectRequest {
                frame: frame.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| DetectError::Failure("engine thread exited".into()))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "detection timed out");
                Err(DetectError::Timeout(self.timeout))
            }
            Ok(Err(_)) => Err(DetectError::Failure("engine thread exited".into())),
            Ok(Ok(result)) => result.map_err(DetectError::from),
        }
    }
}

/// Load both ONNX models and spawn the engine on a dedicated OS thread.
///
/// Fails fast at startup if either model cannot be loaded.
pub fn spawn_engine(
    model_dir: &Path,
    detection_confidence: f32,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let mut pipeline = FacePipeline::load(model_dir, detection_confidence)?;
    tracing::info!(dir = %model_dir.display(), "face models loaded");

    spawn_with(move |frame| pipeline.process(frame), timeout)
}

/// Run `process` for every queued frame on a thread of its own.
fn spawn_with<F>(mut process: F, timeout: Duration) -> Result<EngineHandle, EngineError>
where
    F: FnMut(&Frame) -> Result<Vec<FaceObservation>, PipelineError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(DetectRequest { frame, reply }) = rx.blocking_recv() {
                let result = process(&frame);
                if let Ok(faces) = &result {
                    tracing::debug!(faces = faces.len(), "frame processed");
                }
                // The requester may have timed out and gone away.
                let _ = reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, timeout })
}
