//! Batch import of labeled face images.
//!
//! Seeds the gallery from a folder per person. The folder name is the
//! label; no identity resolution is performed. Labels that are already
//! enrolled are left alone, so re-running an import is harmless.

use crate::frame::Frame;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Images taken per label directory when the caller does not say otherwise.
pub const DEFAULT_IMAGES_PER_LABEL: usize = 2;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One image to import under a label.
#[derive(Debug, Clone)]
pub struct ImportItem {
    pub label: String,
    pub frame: Frame,
    /// Where the frame came from, for reporting.
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Labels created, with the number of embeddings stored for each.
    pub created: Vec<(String, usize)>,
    /// Labels left untouched because they were already enrolled.
    pub skipped: Vec<String>,
    /// Rejected frames or labels, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Group items by label, keeping first-appearance order of labels and
/// the original order of frames within a label.
pub fn group_by_label(items: Vec<ImportItem>) -> Vec<(String, Vec<ImportItem>)> {
    let mut groups: Vec<(String, Vec<ImportItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(label, _)| *label == item.label) {
            Some((_, group)) => group.push(item),
            None => groups.push((item.label.clone(), vec![item])),
        }
    }
    groups
}

/// Items read from a label directory tree, plus the entries that could
/// not be read.
#[derive(Debug, Default)]
pub struct ImportScan {
    pub items: Vec<ImportItem>,
    /// Unreadable label directories or images, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Collect import items from `<dir>/<label>/<image>`.
///
/// Label directories are visited in name order; within each the first
/// `per_label` images in natural file-name order (`2.jpg` before `10.jpg`)
/// are taken. Files with other extensions and hidden entries are ignored.
/// Only an unreadable `dir` is an error; unreadable entries below it are
/// reported in [`ImportScan::failed`].
pub fn scan_labels_dir(dir: &Path, per_label: usize) -> io::Result<ImportScan> {
    let mut label_dirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && !is_hidden(path))
        .collect();
    label_dirs.sort_by_cached_key(|path| natural_key(path));

    let mut scan = ImportScan::default();
    for label_dir in label_dirs {
        let Some(label) = label_dir.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %label_dir.display(), "skipping non UTF-8 label directory");
            continue;
        };

        let entries = match std::fs::read_dir(&label_dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %label_dir.display(), error = %err, "unreadable label directory");
                scan.failed.push((label_dir.display().to_string(), err.to_string()));
                continue;
            }
        };
        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && !is_hidden(path) && is_image(path))
            .collect();
        images.sort_by_cached_key(|path| natural_key(path));

        if images.is_empty() {
            tracing::warn!(label, "label directory has no images");
        }

        for path in images.into_iter().take(per_label) {
            match std::fs::read(&path) {
                Ok(bytes) => scan.items.push(ImportItem {
                    label: label.to_string(),
                    frame: Frame::from_bytes(bytes),
                    source: path.display().to_string(),
                }),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "unreadable image");
                    scan.failed.push((path.display().to_string(), err.to_string()));
                }
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        items = scan.items.len(),
        failed = scan.failed.len(),
        "scanned label directory"
    );
    Ok(scan)
}

/// A run of a file name: digits compare by value, text by character.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk {
    /// Significant digit count, then the digits without leading zeros.
    Number(usize, String),
    Text(String),
}

/// Sort key giving natural order of the file name of `path`.
fn natural_key(path: &Path) -> Vec<NameChunk> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut chunks = Vec::new();
    let mut rest = name.as_str();
    while let Some(first) = rest.chars().next() {
        let is_digit = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != is_digit)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        chunks.push(if is_digit {
            let digits = run.trim_start_matches('0');
            NameChunk::Number(digits.len(), digits.to_string())
        } else {
            NameChunk::Text(run.to_string())
        });
        rest = tail;
    }
    chunks
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
