use facematch_core::{scan_labels_dir, FaceService, Frame, SessionError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use zbus::interface;

pub const BUS_NAME: &str = "io.facematch.FaceMatch1";
pub const OBJECT_PATH: &str = "/io/facematch/FaceMatch1";

/// D-Bus interface for the face-matching daemon.
///
/// Bus name: io.facematch.FaceMatch1
/// Object path: /io/facematch/FaceMatch1
pub struct FaceMatchService {
    service: Arc<FaceService>,
    import_per_label: usize,
    model_dir: PathBuf,
    db_path: PathBuf,
    started_at: Instant,
}

impl FaceMatchService {
    pub fn new(
        service: Arc<FaceService>,
        import_per_label: usize,
        model_dir: PathBuf,
        db_path: PathBuf,
    ) -> Self {
        Self {
            service,
            import_per_label,
            model_dir,
            db_path,
            started_at: Instant::now(),
        }
    }
}

fn to_fdo(err: SessionError) -> zbus::fdo::Error {
    match err {
        SessionError::InvalidFrame(_) | SessionError::InvalidLabel(_) | SessionError::LabelTaken(_) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn parse_frame(frame_data: &str) -> zbus::fdo::Result<Frame> {
    Frame::from_data_url(frame_data).map_err(|e| to_fdo(e.into()))
}

#[interface(name = "io.facematch.FaceMatch1")]
impl FaceMatchService {
    /// Labels of every face in the frame, `unknown` for unmatched faces.
    async fn recognize(&self, frame_data: &str) -> zbus::fdo::Result<Vec<String>> {
        let frame = parse_frame(frame_data)?;
        self.service.recognize(&frame).await.map_err(to_fdo)
    }

    /// Enroll the single face in the frame under `name`.
    async fn enroll(&self, name: &str, frame_data: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "enroll requested");
        let frame = parse_frame(frame_data)?;
        let outcome = self.service.enroll(&frame, name).await.map_err(to_fdo)?;

        let mut reply = serde_json::to_value(&outcome)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        reply["message"] = outcome.message().into();
        Ok(reply.to_string())
    }

    /// Import `<dir>/<label>/<image>` files; `per_label` 0 uses the configured default.
    async fn import(&self, dir: &str, per_label: u32) -> zbus::fdo::Result<String> {
        let per_label = match per_label {
            0 => self.import_per_label,
            n => n as usize,
        };
        tracing::info!(dir, per_label, "import requested");

        let root = PathBuf::from(dir);
        let scan = tokio::task::spawn_blocking(move || scan_labels_dir(&root, per_label))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("import scan aborted: {e}")))?
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("{dir}: {e}")))?;

        let mut report = self.service.import(scan.items).await.map_err(to_fdo)?;
        let mut failed = scan.failed;
        failed.append(&mut report.failed);
        report.failed = failed;
        serde_json::to_string(&report).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.service.identities())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Re-read the store; returns the number of identities now loaded.
    async fn reload(&self) -> zbus::fdo::Result<u32> {
        let count = self.service.reload().await.map_err(to_fdo)?;
        Ok(count as u32)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let gallery = self.service.snapshot();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": self.started_at.elapsed().as_secs(),
            "identities": gallery.identities().len(),
            "embeddings": gallery.embedding_count(),
            "match_threshold": self.service.threshold(),
            "model_dir": display(&self.model_dir),
            "db_path": display(&self.db_path),
        })
        .to_string())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
