mod dashboard;
mod render;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use client::api::{HistoryApi, HttpApi};
use client::view::{self, VerdictFilter};
use console::style;
use tracing_subscriber::EnvFilter;
use verdict_core::models::{ImageKind, ImageRef, RecordDraft};
use verdict_core::DEFAULT_PAGE_LIMIT;

#[derive(Parser)]
#[command(name = "verdict", version, about = "Check whether an image is AI-generated")]
struct Cli {
    /// Base URL of the verdict daemon.
    #[arg(long, global = true, env = "VERDICT_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Session token from `verdict-daemon issue-session`.
    #[arg(long, global = true, env = "VERDICT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify an image file or URL.
    Detect {
        #[command(flatten)]
        source: Source,
        /// Print the classifier's raw response as well.
        #[arg(long)]
        raw: bool,
    },
    /// Classify an image and store the result in your history.
    Save {
        #[command(flatten)]
        source: Source,
    },
    /// List saved detections, newest first.
    History {
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value = "all")]
        filter: VerdictFilter,
    },
    /// Delete one saved detection by id.
    Delete { id: String },
    /// Interactive history view with immediate deletes.
    Dashboard {
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u64,
    },
    /// Check the daemon is reachable.
    Health,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Local PNG, JPEG or WEBP file.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Public http(s) image URL.
    #[arg(long)]
    url: Option<String>,
}

impl Source {
    async fn detect(&self, api: &HttpApi) -> anyhow::Result<(verdict_core::wire::DetectResponse, ImageRef)> {
        match (&self.file, &self.url) {
            (Some(path), None) => {
                let resp = api.detect_file(path).await.with_context(|| format!("detecting {}", path.display()))?;
                Ok((resp, ImageRef { kind: ImageKind::Upload, payload_or_url: None }))
            }
            (None, Some(url)) => {
                let resp = api.detect_url(url).await.with_context(|| format!("detecting {url}"))?;
                Ok((resp, ImageRef { kind: ImageKind::Url, payload_or_url: Some(url.trim().to_string()) }))
            }
            _ => bail!("pass exactly one of --file or --url"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = HttpApi::new(&cli.server, cli.token.clone()).context("invalid --server")?;

    match cli.command {
        Command::Detect { source, raw } => {
            let (resp, _) = source.detect(&api).await?;
            render::detection(&resp);
            if raw {
                println!("{}", serde_json::to_string_pretty(&resp.raw_response)?);
            }
        }
        Command::Save { source } => {
            let (resp, image_ref) = source.detect(&api).await?;
            render::detection(&resp);
            let record = api
                .save(&RecordDraft { image_ref, result: resp.result })
                .await
                .context("saving to history")?;
            println!("{} saved as {}", style("✓").green(), style(&record.id).bold());
        }
        Command::History { limit, skip, filter } => {
            let page = api.list(limit, skip).await.context("loading history")?;
            render::stats(&view::stats(&page));
            for (i, record) in view::filtered(&page, filter).into_iter().enumerate() {
                render::record_line(i, record, false);
            }
            render::page_footer(&page);
        }
        Command::Delete { id } => {
            api.remove(&id).await.with_context(|| format!("deleting {id}"))?;
            println!("{} History deleted successfully", style("✓").green());
        }
        Command::Dashboard { limit } => dashboard::run(api, limit).await?,
        Command::Health => {
            let health = api.health().await.context("daemon health check")?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }
    Ok(())
}
