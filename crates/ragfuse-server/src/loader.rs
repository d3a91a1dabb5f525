//! Bulk document loading from files.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{debug, info};

use ragfuse_core::{RagError, Result};

use crate::server::IngestParams;

/// Load ingest requests from a file or directory.
///
/// `.json` files hold one document object or an array of them; `.txt` and
/// `.md` files become one document titled after the file stem. Directories
/// are walked in path order, descending into subdirectories when
/// `recursive` is set.
pub fn load_documents(path: &Path, recursive: bool) -> Result<Vec<IngestParams>> {
    let files = collect_files(path, recursive)?;
    if files.is_empty() {
        return Err(RagError::invalid_argument(format!(
            "No supported files found at {}",
            path.display()
        )));
    }

    let mut docs = Vec::new();
    for file in &files {
        debug!("Loading {}", file.display());
        let loaded = load_file(file)?;
        info!("Loaded {} documents from {}", loaded.len(), file.display());
        docs.extend(loaded);
    }
    Ok(docs)
}

fn load_file(path: &Path) -> Result<Vec<IngestParams>> {
    let text = fs::read_to_string(path)?;

    match extension(path) {
        "json" => {
            let value: Value = serde_json::from_str(&text)?;
            let items = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(RagError::from))
                .collect()
        }
        kind => {
            let title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(String::from);
            let mut doc = IngestParams {
                title,
                content: text,
                ..IngestParams::default()
            };
            doc.metadata
                .insert("source_file".to_string(), json!(path.display().to_string()));
            doc.metadata.insert("file_type".to_string(), json!(kind));
            Ok(vec![doc])
        }
    }
}

fn collect_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_supported_file(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        let mut entries = fs::read_dir(path)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for entry_path in entries {
            if entry_path.is_file() && is_supported_file(&entry_path) {
                files.push(entry_path);
            } else if entry_path.is_dir() && recursive {
                files.extend(collect_files(&entry_path, recursive)?);
            }
        }
    } else {
        return Err(RagError::invalid_argument(format!(
            "Path does not exist: {}",
            path.display()
        )));
    }

    Ok(files)
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

fn is_supported_file(path: &Path) -> bool {
    matches!(extension(path), "json" | "txt" | "md")
}
