//! Validated configuration records handed from the CLI to the library.

use std::path::PathBuf;
use std::time::Duration;

/// Resources in flight at once during a mirror job.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Everything one mirror job needs.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub base_url: String,
    /// Directory that receives the `<site host>/` mirror directory.
    pub output_root: PathBuf,
    pub reject: Vec<String>,
    /// Prefix allowlist despite the name: when non-empty, only URL paths
    /// starting with one of these are downloaded.
    pub exclude: Vec<String>,
    /// Rewrite every mapped reference, not only stylesheet and script links.
    pub convert_links: bool,
    pub max_concurrent: usize,
    /// Bytes per second for each resource stream.
    pub rate_limit: Option<u64>,
    pub timeout: Duration,
    pub user_agent: String,
    pub show_progress: bool,
}

impl MirrorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            output_root: PathBuf::from("."),
            reject: Vec::new(),
            exclude: Vec::new(),
            convert_links: false,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            show_progress: true,
        }
    }
}

/// Settings shared by single-file and batch transfers.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// `-O`: file name for a single download, name prefix for a batch.
    pub output_name: Option<String>,
    /// `-P`: directory that receives the downloaded files.
    pub directory: Option<PathBuf>,
    /// Total bytes per second; batches split it evenly across files.
    pub rate_limit: Option<u64>,
    pub timeout: Duration,
    pub user_agent: String,
    pub show_progress: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            output_name: None,
            directory: None,
            rate_limit: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            show_progress: true,
        }
    }
}

/// What the binary was asked to do.
#[derive(Debug, Clone)]
pub enum Mode {
    Mirror(MirrorConfig),
    Single { url: String, config: TransferConfig },
    Batch { input: PathBuf, config: TransferConfig },
}
