//! Line-delimited JSON input.

use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// `.jsonl` files under `path`, sorted. A file path is returned as-is.
pub fn list_jsonl_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

/// Reads up to `limit` non-blank lines. A line that is not valid JSON is
/// returned as `Value::String` holding the line, which the validator rejects.
pub fn read_jsonl(path: &Path, limit: Option<usize>) -> Result<Vec<Value>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        if limit.is_some_and(|l| out.len() >= l) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(v) => out.push(v),
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e, "malformed JSON line");
                out.push(Value::String(line));
            }
        }
    }
    debug!(path = %path.display(), records = out.len(), "read jsonl");
    Ok(out)
}

/// Reads every `.jsonl` file under `path`, stopping once `limit` records are read.
pub fn read_all(path: &Path, limit: Option<usize>) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for file in list_jsonl_files(path)? {
        let remaining = limit.map(|l| l.saturating_sub(out.len()));
        if remaining == Some(0) {
            break;
        }
        out.extend(read_jsonl(&file, remaining)?);
    }
    Ok(out)
}
