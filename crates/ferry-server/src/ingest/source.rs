//! Source discovery
//!
//! Turns a submitted `file_path` into the ordered list of JSON files to read.
//! Directories are walked recursively with entries sorted by file name, so the
//! visit order (and therefore chunk numbering) is stable across restarts.
//! Remote http(s) sources are streamed to a temporary file first.

use std::path::{Path, PathBuf};

use ferry_common::{FerryError, Result};
use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Files to extract, in visit order. Holds any downloaded temp file alive.
#[derive(Debug)]
pub struct ResolvedSource {
    pub files: Vec<PathBuf>,
    _download: Option<NamedTempFile>,
}

impl ResolvedSource {
    pub fn local(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            _download: None,
        }
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Resolves local paths and remote URLs into readable files
#[derive(Debug, Clone)]
pub struct SourceResolver {
    client: reqwest::Client,
}

impl SourceResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn resolve(&self, source: &str) -> Result<ResolvedSource> {
        if is_remote(source) {
            self.download(source).await
        } else {
            let path = PathBuf::from(source);
            tokio::task::spawn_blocking(move || discover_local(&path))
                .await
                .map_err(|e| FerryError::Io(std::io::Error::other(e)))?
                .map(ResolvedSource::local)
        }
    }

    async fn download(&self, url: &str) -> Result<ResolvedSource> {
        info!(url, "Downloading remote source");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FerryError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FerryError::SourceNotFound(format!(
                "{} (HTTP {})",
                url,
                response.status()
            )));
        }

        let download = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(download.reopen()?);
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|e| FerryError::Network(e.to_string()))?;
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.flush().await?;

        debug!(url, bytes = written, path = %download.path().display(), "Remote source downloaded");

        Ok(ResolvedSource {
            files: vec![download.path().to_path_buf()],
            _download: Some(download),
        })
    }
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Single file, or every `*.json` under a directory (recursive, sorted)
pub fn discover_local(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        return Err(FerryError::SourceNotFound(path.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| FerryError::Io(std::io::Error::other(e)))?;
        if entry.file_type().is_file() && is_json_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(FerryError::SourceNotFound(format!(
            "no .json files under {}",
            path.display()
        )));
    }

    Ok(files)
}
