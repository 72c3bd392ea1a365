use clap::builder::TypedValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{MirrorConfig, Mode, TransferConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_TIMEOUT_SECS};
use crate::rate_limit::parse_rate_limit;

#[derive(Parser, Debug)]
#[command(
    name = "site-fetch",
    about = "Download files or mirror a website for offline viewing",
    version,
    long_about = "Downloads single files with a progress bar, lists of files concurrently, or a static copy of a web page together with its same-site images, stylesheets and scripts, rewriting links to the local copies."
)]
pub struct FetchCommand {
    /// URL to download or mirror
    pub url: Option<String>,

    /// Save the download under this file name (prefix for -i lists)
    #[arg(short = 'O')]
    pub output_file: Option<String>,

    /// Directory to save downloads in
    #[arg(short = 'P')]
    pub directory: Option<PathBuf>,

    /// Run in the background, writing output to "wget-log"
    #[arg(short = 'B')]
    pub background: bool,

    /// Download every URL listed in this file
    #[arg(short = 'i')]
    pub input_file: Option<PathBuf>,

    /// Limit download speed, e.g. 400k or 2M
    #[arg(long, value_parser = parse_rate)]
    pub rate_limit: Option<u64>,

    /// Mirror the page and its same-site resources
    #[arg(long)]
    pub mirror: bool,

    /// Skip resources whose path contains any of these (comma-separated)
    #[arg(short = 'R', long, value_delimiter = ',')]
    pub reject: Vec<String>,

    /// Only fetch resources whose path starts with one of these (comma-separated)
    #[arg(short = 'X', long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Point every mirrored reference at its local copy
    #[arg(long)]
    pub convert_links: bool,

    /// Maximum concurrent resource downloads while mirroring
    #[arg(short = 'c', long, default_value_t = DEFAULT_MAX_CONCURRENT, value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    pub max_concurrent: usize,

    /// Timeout for requests in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_rate(input: &str) -> Result<u64, String> {
    match parse_rate_limit(input) {
        Ok(Some(rate)) => Ok(rate),
        Ok(None) => Err("rate limit must not be empty".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

impl FetchCommand {
    /// Log level used when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Validates the flags into the job to run.
    pub fn into_mode(self, show_progress: bool) -> anyhow::Result<Mode> {
        let timeout = Duration::from_secs(self.timeout);
        let directory = self.directory.map(expand_home);

        if let Some(input) = self.input_file {
            return Ok(Mode::Batch {
                input,
                config: TransferConfig {
                    output_name: self.output_file,
                    directory,
                    rate_limit: self.rate_limit,
                    timeout,
                    show_progress,
                    ..TransferConfig::default()
                },
            });
        }

        let url = self
            .url
            .ok_or_else(|| anyhow::anyhow!("a URL is required unless -i is given"))?;

        if self.mirror {
            let mut config = MirrorConfig::new(url);
            if let Some(dir) = directory {
                config.output_root = dir;
            }
            config.reject = clean(self.reject);
            config.exclude = clean(self.exclude);
            config.convert_links = self.convert_links;
            config.max_concurrent = self.max_concurrent;
            config.rate_limit = self.rate_limit;
            config.timeout = timeout;
            config.show_progress = show_progress;
            return Ok(Mode::Mirror(config));
        }

        Ok(Mode::Single {
            url,
            config: TransferConfig {
                output_name: self.output_file,
                directory,
                rate_limit: self.rate_limit,
                timeout,
                show_progress,
                ..TransferConfig::default()
            },
        })
    }
}

/// Trims rule entries and drops empty ones, so `-R ",png, "` is `["png"]`.
fn clean(rules: Vec<String>) -> Vec<String> {
    rules
        .into_iter()
        .map(|rule| rule.trim().to_string())
        .filter(|rule| !rule.is_empty())
        .collect()
}

/// Replaces a leading `~` with the home directory.
fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}
