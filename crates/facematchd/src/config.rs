use facematch_core::{DEFAULT_IMAGES_PER_LABEL, DEFAULT_MATCH_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Daemon configuration.
///
/// Built from defaults, then the optional TOML file, then `FACEMATCH_*`
/// environment variables; later sources win.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Largest Euclidean distance still counted as a match.
    pub match_threshold: f32,
    /// Minimum SCRFD score for a detection.
    pub detection_confidence: f32,
    /// Upper bound on one detection request, in seconds.
    pub detect_timeout_secs: u64,
    /// Images taken per label directory on import.
    pub import_per_label: usize,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
}

/// Keys accepted in `facematchd.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    detection_confidence: Option<f32>,
    detect_timeout_secs: Option<u64>,
    import_per_label: Option<usize>,
    system_bus: Option<bool>,
}

impl Config {
    /// Load from `FACEMATCH_CONFIG` (or the XDG default path, if present)
    /// and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();

        let file = match env("FACEMATCH_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => {
                let path = xdg_dir("XDG_CONFIG_HOME", ".config").join("facematch/facematchd.toml");
                if path.exists() {
                    read_file(&path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let config = Self::from_sources(file, env);
        config.validate()?;
        Ok(config)
    }

    fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = env("FACEMATCH_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.model_dir)
            .unwrap_or_else(facematch_models::default_model_dir);

        let db_path = env("FACEMATCH_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| xdg_dir("XDG_DATA_HOME", ".local/share").join("facematch/faces.db"));

        Self {
            model_dir,
            db_path,
            match_threshold: parsed(&env, "FACEMATCH_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
            detection_confidence: parsed(&env, "FACEMATCH_DETECTION_CONFIDENCE")
                .or(file.detection_confidence)
                .unwrap_or(0.5),
            detect_timeout_secs: parsed(&env, "FACEMATCH_DETECT_TIMEOUT_SECS")
                .or(file.detect_timeout_secs)
                .unwrap_or(10),
            import_per_label: parsed(&env, "FACEMATCH_IMPORT_PER_LABEL")
                .or(file.import_per_label)
                .unwrap_or(DEFAULT_IMAGES_PER_LABEL),
            system_bus: env("FACEMATCH_SYSTEM_BUS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(file.system_bus)
                .unwrap_or(false),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be a positive number, got {}",
                self.match_threshold
            )));
        }
        if !(self.detection_confidence > 0.0 && self.detection_confidence < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "detection_confidence must be in (0, 1), got {}",
                self.detection_confidence
            )));
        }
        if self.detect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("detect_timeout_secs must be at least 1".into()));
        }
        if self.import_per_label == 0 {
            return Err(ConfigError::Invalid("import_per_label must be at least 1".into()));
        }
        Ok(())
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(fallback)
    })
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
