use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::config::MirrorConfig;
use crate::downloader::ResourceDownloader;
use crate::error::MirrorError;
use crate::fetcher::{build_http_client, ResourceFetcher};
use crate::file_manager::{is_contained, FileManager};
use crate::filter::FilterRules;
use crate::resolver::{site_host, url_path};
use crate::rewriter::{rewrite, RewriteMode};

/// What a finished mirror job produced.
#[derive(Debug, Clone)]
pub struct MirrorSummary {
    /// `<output_root>/<site host>`.
    pub output_dir: PathBuf,
    /// Where the page itself was saved, relative to `output_dir`.
    pub page_path: String,
    /// References rewritten or available for rewriting.
    pub resources: usize,
    pub failed: usize,
    pub filtered: usize,
}

/// Mirrors one page and its same-site resources into a directory named
/// after the site host.
pub struct WebsiteMirror {
    config: MirrorConfig,
    client: Client,
}

impl WebsiteMirror {
    pub fn new(config: MirrorConfig) -> Result<Self, MirrorError> {
        let client =
            build_http_client(&config.user_agent, config.timeout).map_err(MirrorError::Client)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub async fn mirror_website(&self) -> Result<MirrorSummary, MirrorError> {
        let base_url = Url::parse(&self.config.base_url)
            .map_err(|e| MirrorError::parse(&self.config.base_url, e))?;
        let host = site_host(&base_url).ok_or_else(|| MirrorError::invalid_path(&base_url))?;

        info!(url = %base_url, "starting mirror");
        let output_dir = self.config.output_root.join(&host);
        let file_manager = FileManager::new(&output_dir)?;
        info!(dir = %output_dir.display(), "created mirror directory");

        let page = self.fetch_page(&base_url).await?;

        let progress = self.spinner();
        let fetcher = ResourceFetcher::new(
            self.client.clone(),
            file_manager.clone(),
            FilterRules::new(self.config.reject.clone(), self.config.exclude.clone()),
        )
        .with_rate_limit(self.config.rate_limit);
        let report = ResourceDownloader::new(fetcher)
            .with_max_concurrent(self.config.max_concurrent)
            .with_progress(progress.clone())
            .download_all(&page, &base_url)
            .await?;
        progress.finish_and_clear();

        let mode = RewriteMode::from_convert_links(self.config.convert_links);
        let page = rewrite(&page, &report.mapping, mode);

        let page_path = page_path(&file_manager, &base_url, &page)?;
        let saved = file_manager.save_file(&page_path, page.as_bytes())?;
        info!(path = %saved.display(), "saved page");

        Ok(MirrorSummary {
            output_dir,
            page_path,
            resources: report.mapping.len(),
            failed: report.failed,
            filtered: report.filtered,
        })
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, MirrorError> {
        info!(url = %url, "downloading page");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MirrorError::page_fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::page_fetch(url, format!("HTTP {status}")));
        }
        debug!(url = %url, status = %status, "got page response");

        response
            .text()
            .await
            .map_err(|e| MirrorError::page_fetch(url, e))
    }

    fn spinner(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner
    }
}

/// Relative path the page is saved under.
///
/// An empty URL path gives `index.html`, a trailing slash or an extensionless
/// path whose content looks like HTML gives `<path>/index.html`. Anything else
/// is used as-is.
pub fn page_path(file_manager: &FileManager, url: &Url, content: &str) -> Result<String, MirrorError> {
    let path = url_path(url);
    let relative = path.strip_prefix('/').unwrap_or(&path);

    if relative.is_empty() {
        return Ok("index.html".to_string());
    }
    if !is_contained(relative) {
        return Err(MirrorError::invalid_path(url));
    }
    if relative.ends_with('/') {
        return Ok(format!("{relative}index.html"));
    }
    if Path::new(relative).extension().is_some() {
        return Ok(relative.to_string());
    }

    debug!(path = relative, "no extension, checking whether content is HTML");
    if file_manager.probe_is_html(content)? {
        Ok(format!("{relative}/index.html"))
    } else {
        Ok(relative.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_page_path_decisions() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();
        let html = "<!DOCTYPE html><html></html>";

        let cases = vec![
            ("http://example.test", html, "index.html"),
            ("http://example.test/", html, "index.html"),
            ("http://example.test/docs/", html, "docs/index.html"),
            ("http://example.test/page.php", html, "page.php"),
            ("http://example.test/about", html, "about/index.html"),
            ("http://example.test/blog/post", "<html lang=\"en\">", "blog/post/index.html"),
            ("http://example.test/robots", "User-agent: *", "robots"),
        ];

        for (input, content, expected) in cases {
            let result = page_path(&fm, &url(input), content).unwrap();
            assert_eq!(result, expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_page_path_probe_is_removed() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();

        page_path(&fm, &url("http://example.test/about"), "<!DOCTYPE html>").unwrap();

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_mirror_setup_keeps_config() {
        let temp_dir = tempdir().unwrap();
        let mut config = MirrorConfig::new("https://example.com");
        config.output_root = temp_dir.path().to_path_buf();
        config.max_concurrent = 3;

        let mirror = WebsiteMirror::new(config).unwrap();

        assert_eq!(mirror.config().base_url, "https://example.com");
        assert_eq!(mirror.config().max_concurrent, 3);
    }
}
