//! Concurrent download of the resources referenced by one page.
//!
//! The coordinator scans the page, resolves every reference and spawns one
//! task per distinct same-site URL. A single semaphore caps the number of
//! fetches in flight for the whole call. When a fetched resource is a
//! stylesheet, its task re-reads the file and hands the references found in
//! it back to the coordinator, which spawns them into the same task set. The
//! call returns once that set has drained.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DEFAULT_MAX_CONCURRENT;
use crate::discovery::{is_stylesheet, PatternScanner, ReferenceScanner};
use crate::error::MirrorError;
use crate::fetcher::ResourceFetcher;
use crate::filter::should_skip_reference;
use crate::resolver::{resolve_against, same_site_url};

/// Original reference literal -> local relative path.
pub type ResourceMapping = HashMap<String, String>;

/// Result of one [`ResourceDownloader::download_all`] call.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub mapping: ResourceMapping,
    /// Distinct URLs written to disk.
    pub fetched: usize,
    /// URLs that failed to download or had no usable path.
    pub failed: usize,
    /// URLs skipped by reject/exclude rules.
    pub filtered: usize,
    /// Highest number of fetches that were active at the same time.
    pub peak_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Page,
    Stylesheet,
}

#[derive(Debug, Clone)]
struct Candidate {
    reference: String,
    url: Url,
    origin: Origin,
}

/// Mapping shared by all workers of one call. The lock is only held for a
/// single insert.
#[derive(Debug, Default, Clone)]
struct SharedMapping(Arc<Mutex<ResourceMapping>>);

impl SharedMapping {
    /// Page references overwrite; stylesheet references never replace an
    /// entry made for the page.
    fn record(&self, candidate: &Candidate, local_path: &str) {
        let mut mapping = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match candidate.origin {
            Origin::Page => {
                mapping.insert(candidate.reference.clone(), local_path.to_string());
            }
            Origin::Stylesheet => {
                mapping
                    .entry(candidate.reference.clone())
                    .or_insert_with(|| local_path.to_string());
            }
        }
    }

    fn snapshot(&self) -> ResourceMapping {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[derive(Debug, Default)]
struct InFlight {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Downloads every same-site resource a page references.
#[derive(Clone)]
pub struct ResourceDownloader {
    fetcher: Arc<ResourceFetcher>,
    page_scanner: Arc<dyn ReferenceScanner>,
    stylesheet_scanner: Arc<dyn ReferenceScanner>,
    max_concurrent: usize,
    progress: ProgressBar,
}

impl ResourceDownloader {
    pub fn new(fetcher: ResourceFetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            page_scanner: Arc::new(PatternScanner::page()),
            stylesheet_scanner: Arc::new(PatternScanner::stylesheet()),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            progress: ProgressBar::hidden(),
        }
    }

    /// Caps the number of concurrent fetches. Values below one are raised to one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_scanners(
        mut self,
        page: Arc<dyn ReferenceScanner>,
        stylesheet: Arc<dyn ReferenceScanner>,
    ) -> Self {
        self.page_scanner = page;
        self.stylesheet_scanner = stylesheet;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Downloads the resources referenced by `page_text`, a page served from
    /// `page_url`, and the resources referenced by any stylesheet among them.
    ///
    /// Per-resource failures only leave that resource out of the mapping.
    /// Failing to create a directory aborts the call.
    pub async fn download_all(
        &self,
        page_text: &str,
        page_url: &Url,
    ) -> Result<DownloadReport, MirrorError> {
        info!(url = %page_url, "scanning for resources");
        let mut run = Run::new(self, page_url);
        for candidate in candidates(self.page_scanner.as_ref(), page_text, page_url, Origin::Page)
        {
            run.dispatch(candidate);
        }
        run.finish().await
    }
}

/// Identity of a resource within one call: the URL without query and
/// fragment, matching what the local path keeps.
fn dispatch_key(url: &Url) -> Url {
    let mut key = url.clone();
    key.set_query(None);
    key.set_fragment(None);
    key
}

/// Turns scanned references into same-site download candidates.
fn candidates(
    scanner: &dyn ReferenceScanner,
    text: &str,
    base: &Url,
    origin: Origin,
) -> Vec<Candidate> {
    scanner
        .scan(text)
        .into_iter()
        .filter(|reference| !should_skip_reference(reference))
        .filter_map(|reference| {
            let url = match resolve_against(base, &reference) {
                Ok(url) => url,
                Err(e) => {
                    debug!(error = %e, "dropping unresolvable reference");
                    return None;
                }
            };
            if !same_site_url(base, &url) {
                debug!(url = %url, "skipping external resource");
                return None;
            }
            Some(Candidate {
                reference,
                url,
                origin,
            })
        })
        .collect()
}

struct WorkerOutcome {
    url: Url,
    result: Result<String, MirrorError>,
    follow_ups: Vec<Candidate>,
}

/// State cloned into every spawned task.
#[derive(Clone)]
struct Worker {
    fetcher: Arc<ResourceFetcher>,
    stylesheet_scanner: Arc<dyn ReferenceScanner>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    mapping: SharedMapping,
    progress: ProgressBar,
}

impl Worker {
    async fn run(self, candidate: Candidate) -> WorkerOutcome {
        let result = self.fetch(&candidate).await;
        let follow_ups = match &result {
            Ok(local_path) => {
                self.mapping.record(&candidate, local_path);
                if is_stylesheet(local_path) {
                    self.scan_stylesheet(&candidate.url, local_path).await
                } else {
                    Vec::new()
                }
            }
            Err(_) => Vec::new(),
        };
        WorkerOutcome {
            url: candidate.url,
            result,
            follow_ups,
        }
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<String, MirrorError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MirrorError::resource_fetch(&candidate.url, "worker pool closed"))?;
        let _active = self.in_flight.enter();
        self.progress
            .set_message(format!("Downloading: {}", candidate.url));
        self.fetcher.fetch(&candidate.url).await
    }

    async fn scan_stylesheet(&self, url: &Url, local_path: &str) -> Vec<Candidate> {
        let path = self.fetcher.file_manager().full_path(local_path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(url = %url, "scanning stylesheet for resources");
                let css = String::from_utf8_lossy(&bytes);
                candidates(
                    self.stylesheet_scanner.as_ref(),
                    &css,
                    url,
                    Origin::Stylesheet,
                )
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot re-read stylesheet");
                Vec::new()
            }
        }
    }
}

/// One `download_all` call: the task set plus the bookkeeping that only the
/// coordinator touches.
struct Run {
    worker: Worker,
    tasks: JoinSet<WorkerOutcome>,
    /// The page itself is saved by the caller and never fetched as a resource.
    page_key: Url,
    dispatched: HashSet<Url>,
    aliases: Vec<Candidate>,
}

impl Run {
    fn new(downloader: &ResourceDownloader, page_url: &Url) -> Self {
        Self {
            worker: Worker {
                fetcher: Arc::clone(&downloader.fetcher),
                stylesheet_scanner: Arc::clone(&downloader.stylesheet_scanner),
                semaphore: Arc::new(Semaphore::new(downloader.max_concurrent)),
                in_flight: Arc::new(InFlight::default()),
                mapping: SharedMapping::default(),
                progress: downloader.progress.clone(),
            },
            tasks: JoinSet::new(),
            page_key: dispatch_key(page_url),
            dispatched: HashSet::new(),
            aliases: Vec::new(),
        }
    }

    /// Spawns a fetch for a URL not seen before in this call. A reference to
    /// an already dispatched URL is kept as an alias of that fetch.
    fn dispatch(&mut self, candidate: Candidate) {
        let key = dispatch_key(&candidate.url);
        if key == self.page_key {
            debug!(reference = %candidate.reference, "skipping reference to the page itself");
            return;
        }
        if !self.dispatched.insert(key) {
            debug!(reference = %candidate.reference, url = %candidate.url, "already dispatched");
            self.aliases.push(candidate);
            return;
        }
        let worker = self.worker.clone();
        self.tasks.spawn(worker.run(candidate));
    }

    async fn finish(mut self) -> Result<DownloadReport, MirrorError> {
        let mut fetched: HashMap<Url, String> = HashMap::new();
        let mut failed = 0;
        let mut filtered = 0;

        while let Some(joined) = self.tasks.join_next().await {
            self.worker.progress.inc(1);
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "resource task did not complete");
                    failed += 1;
                    continue;
                }
            };

            match outcome.result {
                Ok(local_path) => {
                    fetched.insert(dispatch_key(&outcome.url), local_path);
                }
                Err(e) if e.is_fatal() => {
                    self.tasks.abort_all();
                    return Err(e);
                }
                Err(MirrorError::FilteredOut { .. }) => filtered += 1,
                Err(e) => {
                    warn!(error = %e, "resource skipped");
                    failed += 1;
                }
            }

            for candidate in outcome.follow_ups {
                self.dispatch(candidate);
            }
        }

        for alias in &self.aliases {
            if let Some(local_path) = fetched.get(&dispatch_key(&alias.url)) {
                self.worker.mapping.record(alias, local_path);
            }
        }

        let report = DownloadReport {
            mapping: self.worker.mapping.snapshot(),
            fetched: fetched.len(),
            failed,
            filtered,
            peak_in_flight: self.worker.in_flight.peak(),
        };
        info!(
            fetched = report.fetched,
            failed = report.failed,
            filtered = report.filtered,
            "resource downloads finished"
        );
        Ok(report)
    }
}
