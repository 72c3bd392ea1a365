pub mod background;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod file_manager;
pub mod filter;
pub mod mirror;
pub mod rate_limit;
pub mod resolver;
pub mod rewriter;
pub mod transfer;

// Re-export main types for convenience
pub use cli::FetchCommand;
pub use config::{MirrorConfig, Mode, TransferConfig};
pub use discovery::{PatternScanner, ReferenceScanner};
pub use downloader::{DownloadReport, ResourceDownloader, ResourceMapping};
pub use error::{MirrorError, RateLimitError, TransferError};
pub use fetcher::ResourceFetcher;
pub use file_manager::FileManager;
pub use filter::FilterRules;
pub use mirror::{MirrorSummary, WebsiteMirror};
pub use rewriter::{rewrite, RewriteMode};
