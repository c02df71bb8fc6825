//! OSM extract download.
//!
//! Streams the configured `osm_url` to `osm_filename` so the importer can
//! bootstrap on a fresh machine.

use std::path::Path;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

/// Downloads a file from a URL to a local path with progress logging.
///
/// The body is streamed into `<dest>.part` and renamed on completion, so
/// an interrupted download never leaves a truncated extract in place.
///
/// # Errors
///
/// Returns an error if the HTTP request fails, the response is not
/// successful, or the local file cannot be written.
pub async fn download_file(url: &str, dest: &Path) -> Result<u64, DownloadError> {
    log::info!("Downloading {url}");
    log::info!("  -> {}", dest.display());

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let client = reqwest::Client::builder()
        .user_agent("geoindex/0.1")
        .build()
        .map_err(DownloadError::Http)?;

    let response = client.get(url).send().await.map_err(DownloadError::Http)?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total_size = response.content_length();
    if let Some(size) = total_size {
        #[allow(clippy::cast_precision_loss)]
        let mb = size as f64 / 1_048_576.0;
        log::info!("  file size: {mb:.1} MB");
    }

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| io_error(&partial, e))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_log_mb: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DownloadError::Http)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| io_error(&partial, e))?;
        downloaded += chunk.len() as u64;

        // Every 50 MB
        let current_mb = downloaded / (50 * 1_048_576);
        if current_mb > last_log_mb {
            last_log_mb = current_mb;
            #[allow(clippy::cast_precision_loss)]
            let mb = downloaded as f64 / 1_048_576.0;
            if let Some(total) = total_size {
                #[allow(clippy::cast_precision_loss)]
                let pct = (downloaded as f64 / total as f64) * 100.0;
                log::info!("  downloaded {mb:.0} MB ({pct:.0}%)");
            } else {
                log::info!("  downloaded {mb:.0} MB");
            }
        }
    }

    file.flush().await.map_err(|e| io_error(&partial, e))?;
    drop(file);

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| io_error(dest, e))?;

    #[allow(clippy::cast_precision_loss)]
    let mb = downloaded as f64 / 1_048_576.0;
    log::info!("  download complete: {mb:.1} MB");

    Ok(downloaded)
}

fn partial_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    name.into()
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Errors from download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// I/O error writing to disk.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `download` was requested without an `osm_url`.
    #[error("No osm_url configured")]
    NoUrl,
}
