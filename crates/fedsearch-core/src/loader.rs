use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::Document;

/// Reads `Document`s from JSON Lines files.
///
/// A path may name a single file or a directory; directories are walked for
/// `*.jsonl` files in sorted order. Blank lines are skipped, later duplicates
/// of an ID are dropped.
#[derive(Default)]
pub struct DocumentLoader {
    limit: Option<usize>,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    pub fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let files = if path.is_dir() { self.list_jsonl_files(path) } else { vec![path.to_path_buf()] };
        if files.is_empty() {
            warn!("No .jsonl files found under {}", path.display());
            return Ok(vec![]);
        }
        let mut seen = HashSet::new();
        let mut docs = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            info!("Loading file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            for doc in self.parse_file(file_path)? {
                if !seen.insert(doc.id) {
                    warn!(id = doc.id, "duplicate document id, keeping the first");
                    continue;
                }
                docs.push(doc);
                if self.limit.is_some_and(|l| docs.len() >= l) {
                    info!("Limited to first {} documents", docs.len());
                    return Ok(docs);
                }
            }
        }
        info!("Loaded {} documents from {} files", docs.len(), files.len());
        Ok(docs)
    }

    fn parse_file(&self, file_path: &Path) -> Result<Vec<Document>> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("reading {}", file_path.display()))?;
        let mut docs = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() { continue; }
            let doc: Document = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid document", file_path.display(), line_no + 1))?;
            docs.push(doc);
        }
        Ok(docs)
    }

    fn list_jsonl_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("jsonl"))
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }
}
