use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::encode_data_url;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "io.facematch.FaceMatch1",
    default_service = "io.facematch.FaceMatch1",
    default_path = "/io/facematch/FaceMatch1"
)]
trait FaceMatch {
    fn recognize(&self, frame_data: &str) -> zbus::Result<Vec<String>>;
    fn enroll(&self, name: &str, frame_data: &str) -> zbus::Result<String>;
    fn import(&self, dir: &str, per_label: u32) -> zbus::Result<String>;
    fn list_identities(&self) -> zbus::Result<String>;
    fn reload(&self) -> zbus::Result<u32>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facematch", about = "Face recognition and enrollment CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Name every face in an image
    Recognize {
        /// Image file (JPEG or PNG)
        image: PathBuf,
    },
    /// Enroll the single face in an image
    Enroll {
        /// Image file (JPEG or PNG)
        image: PathBuf,
        /// Name for a new identity; ignored if the face is already enrolled
        #[arg(short, long)]
        name: String,
    },
    /// Seed identities from <dir>/<label>/<image> files
    Import {
        /// Directory with one sub-directory per label
        dir: PathBuf,
        /// Images taken per label (daemon default if omitted)
        #[arg(long)]
        per_label: Option<u32>,
    },
    /// List enrolled identities
    List,
    /// Re-read the embedding store
    Reload,
    /// Show daemon status
    Status,
}

/// MIME type for an image path, by extension.
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn read_frame(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(encode_data_url(mime_for(path), &bytes))
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::debug!(system_bus = cli.system, "connecting to facematchd");

    let connection = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;
    let proxy = FaceMatchProxy::new(&connection)
        .await
        .context("facematchd is not reachable")?;

    match cli.command {
        Commands::Recognize { image } => {
            let labels = proxy.recognize(&read_frame(&image)?).await?;
            if labels.is_empty() {
                println!("no faces found");
            }
            for label in labels {
                println!("{label}");
            }
        }
        Commands::Enroll { image, name } => {
            let reply = proxy.enroll(&name, &read_frame(&image)?).await?;
            let value: serde_json::Value =
                serde_json::from_str(&reply).context("daemon returned invalid JSON")?;
            match value["message"].as_str() {
                Some(message) => println!("{message}"),
                None => println!("{reply}"),
            }
        }
        Commands::Import { dir, per_label } => {
            let dir = std::fs::canonicalize(&dir)
                .with_context(|| format!("cannot resolve {}", dir.display()))?;
            let report = proxy
                .import(&dir.to_string_lossy(), per_label.unwrap_or(0))
                .await?;
            print_json(&report)?;
        }
        Commands::List => {
            let raw = proxy.list_identities().await?;
            let identities: serde_json::Value =
                serde_json::from_str(&raw).context("daemon returned invalid JSON")?;
            match identities.as_array() {
                Some(list) if !list.is_empty() => {
                    for identity in list {
                        println!("{}\t{}", identity["label"].as_str().unwrap_or("?"), identity["embeddings"]);
                    }
                }
                _ => println!("No identities enrolled"),
            }
        }
        Commands::Reload => {
            let count = proxy.reload().await?;
            println!("{count} identities loaded");
        }
        Commands::Status => {
            print_json(&proxy.status().await?)?;
        }
    }

    Ok(())
}
