use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::ToolDescriptor;

/// One descriptor read from disk, with the optional hypothetical queries filed next to it.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub descriptor: ToolDescriptor,
    pub hypothetical_queries: Option<String>,
    pub source: PathBuf,
}

/// Reads `*.json` descriptor files from a directory tree.
///
/// A file holds a single descriptor object or an array of them. The optional
/// `hypothetical_queries` string field is split off before the rest is parsed
/// as a [`ToolDescriptor`].
#[derive(Default)]
pub struct CatalogLoader;

impl CatalogLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load_dir(&self, dir: &Path) -> Result<Vec<CatalogEntry>> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("catalog directory {}", dir.display())));
        }
        let files = self.list_json_files(dir);
        let mut entries = Vec::new();
        for file in &files {
            match self.load_file(file) {
                Ok(mut parsed) => {
                    debug!(path = %file.display(), count = parsed.len(), "loaded descriptors");
                    entries.append(&mut parsed);
                }
                Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable descriptor file"),
            }
        }
        debug!(files = files.len(), descriptors = entries.len(), "catalog scan finished");
        Ok(entries)
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<CatalogEntry>> {
        let raw = fs::read_to_string(path).map_err(|e| Error::Operation(format!("{}: {e}", path.display())))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| Error::InvalidDescriptor(format!("{}: {e}", path.display())))?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        items.into_iter().map(|item| Self::parse_entry(item, path)).collect()
    }

    fn parse_entry(mut item: serde_json::Value, path: &Path) -> Result<CatalogEntry> {
        let hypothetical_queries = item
            .as_object_mut()
            .and_then(|o| o.remove("hypothetical_queries"))
            .and_then(|v| v.as_str().map(str::to_string));
        let descriptor: ToolDescriptor =
            serde_json::from_value(item).map_err(|e| Error::InvalidDescriptor(format!("{}: {e}", path.display())))?;
        descriptor.validate()?;
        Ok(CatalogEntry { descriptor, hypothetical_queries, source: path.to_path_buf() })
    }

    fn list_json_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        files.sort();
        files
    }
}
