//! Error types for mirroring and file transfers.

use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while mirroring a page and its resources.
///
/// Only [`MirrorError::DirectoryCreate`] and [`MirrorError::PageFetch`] abort a
/// mirror job. Every other kind is local to one resource, which is then left
/// out of the resource mapping.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The mirror's base directory or a resource's parent directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The top-level page could not be fetched or returned a non-2xx status.
    #[error("failed to fetch page {url}: {reason}")]
    PageFetch { url: String, reason: String },

    /// A single resource could not be fetched or returned a non-2xx status.
    #[error("failed to fetch resource {url}: {reason}")]
    ResourceFetch { url: String, reason: String },

    /// The resource was excluded by a reject or exclude rule.
    #[error("filtered out by rule: {url}")]
    FilteredOut { url: String },

    /// The URL has no path usable as a file inside the mirror directory.
    #[error("no usable local path for {url}")]
    EmptyOrInvalidPath { url: String },

    /// A base URL or reference could not be parsed.
    #[error("cannot resolve {reference:?}: {source}")]
    Parse {
        reference: String,
        #[source]
        source: url::ParseError,
    },

    /// Writing or reading a file inside the mirror directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl MirrorError {
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    pub fn page_fetch(url: impl Display, reason: impl Display) -> Self {
        Self::PageFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn resource_fetch(url: impl Display, reason: impl Display) -> Self {
        Self::ResourceFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn filtered_out(url: impl Display) -> Self {
        Self::FilteredOut {
            url: url.to_string(),
        }
    }

    pub fn invalid_path(url: impl Display) -> Self {
        Self::EmptyOrInvalidPath {
            url: url.to_string(),
        }
    }

    pub fn parse(reference: impl Into<String>, source: url::ParseError) -> Self {
        Self::Parse {
            reference: reference.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole mirror job.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DirectoryCreate { .. } | Self::PageFetch { .. })
    }
}

/// Errors raised by single-file and batch transfers.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("got status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server sent no bytes and announced no length.
    #[error("could not download {url}: empty response body")]
    EmptyBody { url: String },

    #[error("{failed} of {total} downloads failed")]
    Batch { failed: usize, total: usize },
}

impl TransferError {
    pub fn request(url: impl Display, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A `--rate-limit` value that is not `<digits>[k|m]`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid rate limit {input:?}: expected a number with an optional k or M suffix")]
pub struct RateLimitError {
    pub input: String,
}
