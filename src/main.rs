use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use site_fetch::background::{detach, is_background_child, LOG_FILE};
use site_fetch::fetcher::build_http_client;
use site_fetch::transfer::{destination, download_file, download_many, read_url_list};
use site_fetch::{FetchCommand, Mode, WebsiteMirror};

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = FetchCommand::parse();
    init_tracing(args.log_level());

    let in_background = is_background_child();
    if args.background && !in_background {
        detach(std::env::args_os().skip(1), Path::new(LOG_FILE))?;
        println!("Output will be written to \"{LOG_FILE}\".");
        return Ok(());
    }

    match args.into_mode(!in_background)? {
        Mode::Mirror(config) => {
            let mirror = WebsiteMirror::new(config)?;
            let summary = mirror.mirror_website().await?;
            println!(
                "{} {} ({} resources, {} failed, {} filtered)",
                "Mirrored into".green(),
                summary.output_dir.join(&summary.page_path).display(),
                summary.resources,
                summary.failed,
                summary.filtered,
            );
        }
        Mode::Single { url, config } => {
            let client = build_http_client(&config.user_agent, config.timeout)
                .context("failed to build HTTP client")?;
            let dest = destination(&url, &config);
            download_file(&client, &url, &dest, &config, None).await?;
        }
        Mode::Batch { input, config } => {
            let urls = read_url_list(&input)?;
            if urls.is_empty() {
                anyhow::bail!("no URLs found in {}", input.display());
            }
            let client = build_http_client(&config.user_agent, config.timeout)
                .context("failed to build HTTP client")?;
            download_many(&client, &urls, &config).await?;
        }
    }

    Ok(())
}
