//! Plain file downloads: one URL to one file, or a list of URLs at once.

use std::path::{Path, PathBuf};

use colored::*;
use futures::future::join_all;
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::rate_limit::RateLimiter;

const BAR_TEMPLATE: &str =
    "{msg} {bytes}/{total_bytes} [{bar:50.cyan/blue}] {percent}% {bytes_per_sec} {elapsed}";

/// File name for `url`: its last path segment, or `index.html` when empty.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    match without_query.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "index.html".to_string(),
    }
}

/// Human readable content size in the `[~1.23MB]` / `[~1.23GB]` style.
pub fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1000.0 / 1000.0;
    if mb > 1000.0 {
        format!("{bytes} [~{:.2}GB]", mb / 1000.0)
    } else {
        format!("{bytes} [~{mb:.2}MB]")
    }
}

/// Destination for a single download: `-O` name or the URL's file name,
/// placed in the `-P` directory when one is given.
pub fn destination(url: &str, config: &TransferConfig) -> PathBuf {
    let name = config
        .output_name
        .clone()
        .unwrap_or_else(|| file_name_from_url(url));
    match &config.directory {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn progress_bar(config: &TransferConfig, total: Option<u64>, label: &str) -> ProgressBar {
    if !config.show_progress {
        return ProgressBar::hidden();
    }
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(label.to_string());
    bar
}

/// Downloads `url` into `dest`, printing the request status, content size
/// and destination, with a byte progress bar unless progress is disabled.
pub async fn download_file(
    client: &Client,
    url: &str,
    dest: &Path,
    config: &TransferConfig,
    progress: Option<&MultiProgress>,
) -> Result<u64, TransferError> {
    info!(url, "download started");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| TransferError::request(url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    println!("sending request, awaiting response... status {}", status.to_string().green());

    let content_length = response.content_length();
    println!("content size: {}", format_size(content_length.unwrap_or(0)));

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e))?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| TransferError::io(dest, e))?;
    println!("saving file to: {}", dest.display());

    let mut limiter = config.rate_limit.map(RateLimiter::new);
    if let Some(limiter) = &limiter {
        info!(bytes_per_sec = limiter.bytes_per_sec(), "rate limit set");
    }

    let label = dest.display().to_string();
    let mut bar = progress_bar(config, content_length, &label);
    if let Some(multi) = progress.filter(|_| config.show_progress) {
        bar = multi.add(bar);
    }

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| TransferError::request(url, e))?;
        if let Some(limiter) = limiter.as_mut() {
            limiter.consume(chunk.len()).await;
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await.map_err(|e| TransferError::io(dest, e))?;
    bar.finish();

    if written == 0 {
        return Err(TransferError::EmptyBody {
            url: url.to_string(),
        });
    }

    println!("Downloaded [{}]", url.blue());
    info!(url, bytes = written, "download finished");
    Ok(written)
}

/// Reads one URL per line, skipping blank lines and `#` comments.
pub fn read_url_list(path: &Path) -> Result<Vec<String>, TransferError> {
    let text = std::fs::read_to_string(path).map_err(|e| TransferError::io(path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Output name for entry `index` of a batch.
pub fn batch_destination(url: &str, index: usize, config: &TransferConfig) -> PathBuf {
    let name = match &config.output_name {
        Some(prefix) => format!("{prefix}_{index}"),
        None => file_name_from_url(url),
    };
    match &config.directory {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Downloads every URL concurrently. The rate limit is split evenly so the
/// batch as a whole stays under it.
pub async fn download_many(
    client: &Client,
    urls: &[String],
    config: &TransferConfig,
) -> Result<Vec<PathBuf>, TransferError> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    let mut per_file = config.clone();
    per_file.rate_limit = config
        .rate_limit
        .map(|total| (total / urls.len() as u64).max(1));
    if let Some(rate) = per_file.rate_limit {
        info!(bytes_per_sec = rate, "rate limit per file");
    }

    let multi = MultiProgress::new();
    let downloads = urls.iter().enumerate().map(|(index, url)| {
        let dest = batch_destination(url, index, &per_file);
        let per_file = &per_file;
        let multi = &multi;
        async move {
            let result = download_file(client, url, &dest, per_file, Some(multi)).await;
            (url, dest, result)
        }
    });

    let mut saved = Vec::new();
    let mut failed = 0;
    for (url, dest, result) in join_all(downloads).await {
        match result {
            Ok(_) => {
                println!("Finished {}", dest.display());
                saved.push(dest);
            }
            Err(e) => {
                warn!(url = %url, error = %e, "download failed");
                eprintln!("{} {}", "error downloading".red(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(TransferError::Batch {
            failed,
            total: urls.len(),
        });
    }
    println!("\nDownload finished: {urls:?}");
    Ok(saved)
}
