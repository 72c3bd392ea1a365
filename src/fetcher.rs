use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::{debug, info};
use url::Url;

use crate::error::MirrorError;
use crate::file_manager::FileManager;
use crate::filter::FilterRules;
use crate::rate_limit::RateLimiter;
use crate::resolver::url_path;

/// Builds the HTTP client shared by every request of a job.
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .use_rustls_tls()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Downloads single resources into the mirror directory.
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: Client,
    file_manager: FileManager,
    rules: FilterRules,
    rate_limit: Option<u64>,
}

impl ResourceFetcher {
    pub fn new(client: Client, file_manager: FileManager, rules: FilterRules) -> Self {
        Self {
            client,
            file_manager,
            rules,
            rate_limit: None,
        }
    }

    /// Throttles every resource stream to `bytes_per_sec`.
    pub fn with_rate_limit(mut self, bytes_per_sec: Option<u64>) -> Self {
        self.rate_limit = bytes_per_sec;
        self
    }

    pub fn file_manager(&self) -> &FileManager {
        &self.file_manager
    }

    /// Fetches `url` and writes it under the mirror directory at a path
    /// mirroring the URL path. Returns that relative path.
    pub async fn fetch(&self, url: &Url) -> Result<String, MirrorError> {
        if !self.rules.admit(&url_path(url)) {
            info!(url = %url, "skipping filtered resource");
            return Err(MirrorError::filtered_out(url));
        }

        debug!(url = %url, "downloading resource");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MirrorError::resource_fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::resource_fetch(url, format!("HTTP {status}")));
        }

        let local_path = self.file_manager.local_path(url)?;
        let target = self.file_manager.create_directories_for(&local_path)?;
        let limiter = self.rate_limit.map(RateLimiter::new);
        let written = self
            .file_manager
            .write_stream(&target, url, response.bytes_stream(), limiter)
            .await?;

        info!(url = %url, path = %local_path, bytes = written, "downloaded resource");
        Ok(local_path)
    }
}
