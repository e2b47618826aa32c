//! Collect signals from the configured sources, detect narratives, explain
//! them (and propose build ideas when a language model is configured) and
//! print the Markdown brief to stdout. Logs go to stderr.
//!
//! Usage: `narrative_brief [--config PATH] [--json]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use narrative_radar::config::{load_config_default, load_config_from};
use narrative_radar::explain::Enricher;
use narrative_radar::report::render_markdown;
use narrative_radar::sources::sources_from_config;
use narrative_radar::{init_tracing, Pipeline, RunContext};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut config_path: Option<PathBuf> = None;
    let mut as_json = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(args.next().context("--config needs a path")?.into());
            }
            "--json" => as_json = true,
            other => bail!("unknown argument: {other}"),
        }
    }

    let mut cfg = match &config_path {
        Some(p) => load_config_from(p)?,
        None => load_config_default()?,
    };
    if config_path.is_some() {
        cfg.apply_env_overrides();
    }

    let pipeline = Pipeline::new(cfg).context("invalid pipeline config")?;
    let sources = sources_from_config(pipeline.config());
    let enricher = Enricher::from_config(&pipeline.config().llm);

    let mut ctx = RunContext::new();
    let mut report = pipeline.collect_and_run(&sources, &mut ctx).await?;
    enricher.enrich(&mut report.narratives).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_markdown(&report));
    }
    Ok(())
}
