//! HTTP transport for release artifacts and mirror lists.
//!
//! The orchestrator talks to the network through the [`Fetcher`] trait, which
//! lets tests serve artifacts from memory. [`HttpFetcher`] is the reqwest
//! implementation used by the CLI: it streams downloads straight to disk with a
//! text progress line and reports every failure (connection, timeout, non-2xx
//! status, interrupted body) as a `Network` error so the caller can rank the
//! mirror and move on.
//!
//! There is no retry loop here: retrying is the orchestrator's job, and it
//! retries against a different mirror rather than the same URL.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{Result, ZvmError};

/// Network access used by the download pipeline.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    /// Fetches a small text document (mirror list, checksum, signature).
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Streams `url` into the file at `dest`, replacing it.
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Minimum interval between progress updates in milliseconds.
const PROGRESS_INTERVAL_MS: u128 = 250;

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    /// Builds a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns a `Network` error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zvm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ZvmError::network_with_source("", "failed to create HTTP client", e))?;
        Ok(Self {
            client,
            show_progress: true,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ZvmError::network_with_source(url, describe(&e), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ZvmError::network(url, format!("HTTP error {status}")));
        }
        Ok(response)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!(%url, "fetching");
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| ZvmError::network_with_source(url, "failed to read response body", e))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(%url, dest = %dest.display(), "downloading");
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ZvmError::io(format!("failed to create directory: {}", parent.display()), e)
            })?;
        }

        let response = self.get(url).await?;
        let total_size = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ZvmError::io(format!("failed to create file: {}", dest.display()), e))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let start_time = Instant::now();
        let mut last_update = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ZvmError::network_with_source(url, "download interrupted", e)
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ZvmError::io(format!("failed to write to {}", dest.display()), e))?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if self.show_progress
                && now.duration_since(last_update).as_millis() >= PROGRESS_INTERVAL_MS
            {
                print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
                last_update = now;
            }
        }

        file.flush()
            .await
            .map_err(|e| ZvmError::io(format!("failed to flush {}", dest.display()), e))?;

        if self.show_progress {
            print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
            println!();
        }
        Ok(())
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        "request failed".to_string()
    }
}

/// Prints a simple text-based progress line.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn print_progress(downloaded: u64, total: u64, elapsed_secs: f64) {
    let percent = if total > 0 {
        (downloaded as f64 / total as f64 * 100.0) as u8
    } else {
        0
    };
    let speed = if elapsed_secs > 0.0 {
        downloaded as f64 / elapsed_secs
    } else {
        0.0
    };

    print!(
        "\r{}/{} ({percent}%) {}/s     ",
        format_bytes(downloaded),
        format_bytes(total),
        format_bytes(speed as u64)
    );
    let _ = std::io::stdout().flush();
}

/// Formats bytes into a human-readable string (KB, MB, GB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_timeout_class_failure() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2))
            .unwrap()
            .with_progress(false);
        let temp = tempfile::tempdir().unwrap();

        let err = fetcher
            .download("http://127.0.0.1:9/zig.tar.xz", &temp.path().join("zig.tar.xz"))
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Timeout));
    }
}
