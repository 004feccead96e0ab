//! Match worker binary.
//!
//! Usage:
//! - `duocam-worker <job.json>`: run a serialized [`MatchJob`] and print the
//!   job result to stdout as JSON.
//! - `duocam-worker sync-audio <a.wav> <b.wav> <out.wav> [--mono]`: align
//!   camera B's track onto camera A's and write the mix.

use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use duocam_media::audio::MixRatio;
use duocam_media::core::LogReporter;
use duocam_models::MatchJob;
use duocam_worker::{export_synced_audio, init_tracing, metrics, AudioLayout, MatchPipeline, WorkerConfig};

const USAGE: &str = "usage: duocam-worker <job.json> | duocam-worker sync-audio <a.wav> <b.wav> <out.wav> [--mono]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing().context("failed to initialize tracing")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [command, rest @ ..] if command == "sync-audio" => sync_audio(rest).await,
        [job_path] => run_job(job_path).await,
        _ => bail!(USAGE),
    }
}

async fn run_job(job_path: &str) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr).context("failed to install Prometheus exporter")?;
        info!(%addr, "Serving metrics");
    }

    let raw = tokio::fs::read_to_string(job_path)
        .await
        .with_context(|| format!("failed to read job file {job_path}"))?;
    let job: MatchJob = serde_json::from_str(&raw).with_context(|| format!("invalid job file {job_path}"))?;

    let pipeline = MatchPipeline::new(config);
    let output = pipeline.run(&job, Arc::new(LogReporter)).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn sync_audio(args: &[String]) -> anyhow::Result<()> {
    let (paths, layout) = match args {
        [a, b, out] => ([a, b, out], AudioLayout::Stereo),
        [a, b, out, flag] if flag == "--mono" => ([a, b, out], AudioLayout::Mono),
        _ => bail!(USAGE),
    };
    let [a, b, out] = paths.map(Path::new);

    let result = export_synced_audio(a, b, out, layout, MixRatio::default()).await?;
    let summary = serde_json::json!({
        "output": out,
        "delay_ms": result.delay_ms,
        "confidence": result.confidence,
        "sample_rate": result.sample_rate,
        "duration": result.duration,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
