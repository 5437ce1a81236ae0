//! Best-effort upload of telemetry files to a collection server
//!
//! Uploads are fire-and-forget: the steering loop never blocks on the
//! network, and a failed transfer only logs. A per-uploader guard remembers
//! which files were already sent this session; re-sends are logged and
//! allowed through, since the server deduplicates by name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Concurrent transfers allowed per directory upload
const MAX_PARALLEL_UPLOADS: usize = 5;

/// Sends telemetry files to a remote collection endpoint
#[derive(Debug, Clone)]
pub struct Uploader {
    server_url: String,
    bucket: String,
    client: reqwest::Client,
    sent: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Uploader {
    pub fn new(server_url: &str, bucket: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            client: reqwest::Client::new(),
            sent: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn endpoint(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.server_url,
            percent_encode(&self.bucket),
            percent_encode(file_name)
        )
    }

    /// Uploads one file, waiting for the transfer to finish
    pub async fn upload_file(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("file has no usable name: {path:?}"))?
            .to_string();

        {
            let mut sent = self
                .sent
                .lock()
                .map_err(|_| anyhow!("upload ledger poisoned"))?;
            if !sent.insert(path.to_path_buf()) {
                // Already sent this session; the server overwrites by name
                // so resending is harmless.
                warn!("File {file_name} was already uploaded this session");
            }
        }

        let bytes = tokio::fs::read(path).await?;
        let url = self.endpoint(&file_name);
        debug!("Uploading {} bytes to {url}", bytes.len());

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/force-download")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Upload of {file_name} failed: {status} - {body}"));
        }

        info!("Uploaded {file_name}");
        Ok(())
    }

    /// Uploads every `.json` file in `dir`, at most [`MAX_PARALLEL_UPLOADS`]
    /// in flight at once. Individual failures are logged and counted, never
    /// propagated.
    pub async fn upload_directory(&self, dir: &Path) -> Result<usize> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            debug!("Nothing to upload in {dir:?}");
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_UPLOADS));
        let mut tasks = JoinSet::new();
        for path in paths {
            let uploader = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return false;
                };
                match uploader.upload_file(&path).await {
                    Ok(()) => true,
                    Err(err) => {
                        error!("Upload of {path:?} failed: {err}");
                        false
                    }
                }
            });
        }

        let mut uploaded = 0;
        while let Some(result) = tasks.join_next().await {
            if matches!(result, Ok(true)) {
                uploaded += 1;
            }
        }
        info!("Uploaded {uploaded} files from {dir:?}");
        Ok(uploaded)
    }

    /// Starts an upload without waiting on it; errors only log
    pub fn upload_file_detached(&self, path: &Path) {
        let uploader = self.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            if let Err(err) = uploader.upload_file(&path).await {
                error!("Background upload of {path:?} failed: {err}");
            }
        });
    }
}

/// Percent-encodes everything outside the URL-safe unreserved set
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}
