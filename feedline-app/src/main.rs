use anyhow::{Context, Result, bail};
use clap::Parser;
use feedline_common::observability::init_logging;
use feedline_config::{FeedlineConfig, FeedlineConfigLoader, default_config_path};
use std::path::PathBuf;
use wiring::{build_from_config, log_config};
mod wiring;

/// Ingest a timeline into the local store and optionally print the newest rows.
#[derive(Debug, Parser)]
#[command(name = "feedline", version)]
struct Cli {
    /// Config file. Defaults to ./feedline.yaml, then the user config dir.
    #[arg(long, env = "FEEDLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Print the newest N stored rows as JSON lines after the run.
    #[arg(long, value_name = "N")]
    list: Option<i64>,

    /// Owner to list; defaults to `ingest.owner_user_id`.
    #[arg(long)]
    owner: Option<i64>,

    /// Only provision the schema (and list, if asked).
    #[arg(long)]
    skip_ingest: bool,
}

fn load_config(cli: &Cli) -> Result<FeedlineConfig> {
    let mut loader = FeedlineConfigLoader::new();
    match &cli.config {
        Some(path) => loader = loader.with_file(path),
        None => {
            if let Some(user) = default_config_path() {
                loader = loader.with_optional_file(user);
            }
            loader = loader.with_optional_file("feedline.yaml");
        }
    }
    loader.load().context("loading configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let cfg = load_config(&cli)?;
    let log_path = init_logging(log_config(&cfg.logging))?;
    tracing::info!(log = %log_path.display(), mode = %cfg.source.mode, "app.start");

    let pipeline = build_from_config(&cfg).await?;

    if !cli.skip_ingest {
        let Some(ingest) = &cfg.ingest else {
            bail!("no `ingest` section configured; pass --skip-ingest to only list");
        };
        match pipeline
            .run_with_report(
                &ingest.bearer_token,
                &ingest.provider_user_id,
                ingest.owner_user_id,
                ingest.max_results,
            )
            .await
        {
            Ok(report) => println!(
                "fetched={} skipped={} inserted={}",
                report.fetched, report.skipped, report.inserted
            ),
            Err(err) => {
                tracing::error!(error = %err, retryable = err.is_retryable(), "app.ingest_failed");
                return Err(err.into());
            }
        }
    }

    if let Some(limit) = cli.list {
        let owner = cli
            .owner
            .or(cfg.ingest.as_ref().map(|i| i.owner_user_id))
            .context("--list needs --owner or an `ingest` section")?;
        for row in pipeline.list(owner, limit).await? {
            println!("{}", serde_json::to_string(&row)?);
        }
    }

    pipeline.store().close().await;
    Ok(())
}
