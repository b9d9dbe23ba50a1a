//! vigiltak-assess - run the vision assessment pipeline over local images
//!
//! Points the configured vision model at one image (or every image in a
//! directory) and prints the structured assessment, optionally rendered
//! as the CoT report XML the agent would broadcast. Useful for tuning
//! prompts and checking an Ollama/OpenAI endpoint before wiring it into
//! a running agent.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use vigiltak_core::VisionConfig;
use vigiltak_cot::serialize_event;
use vigiltak_relay::{
    build_report, PatrolPath, PositionFix, ReportIdentity, IMAGERY_CE, IMAGERY_HAE, IMAGERY_LE,
};
use vigiltak_vision::{MediaFile, VisionClient};

/// Assess images with a vision model and print the results
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file or directory of images
    path: PathBuf,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, default_value = "http://127.0.0.1:11434/v1/chat/completions")]
    endpoint: String,

    /// Model name to request
    #[arg(long, default_value = "gemma3:27b")]
    model: String,

    /// Bearer token for the endpoint
    #[arg(long, env = "VIGILTAK_API_KEY")]
    api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout: u64,

    /// Callsign stamped on generated reports
    #[arg(long, default_value = "VIKING1")]
    callsign: String,

    /// Team name stamped on generated reports
    #[arg(long, default_value = "Alpha")]
    team: String,

    /// Patrol start latitude for report positions
    #[arg(long, default_value = "-27.4698")]
    lat: f64,

    /// Patrol start longitude for report positions
    #[arg(long, default_value = "153.0251")]
    lon: f64,

    /// Report stale time in seconds
    #[arg(long, default_value = "5")]
    stale: u64,

    /// Also print each report as CoT XML
    #[arg(long)]
    xml: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let client = VisionClient::new(VisionConfig {
        endpoint: args.endpoint.clone(),
        api_key: args.api_key.clone(),
        model: args.model.clone(),
        timeout_secs: args.timeout,
    })
    .context("failed to build vision client")?;

    let files = collect_images(&args.path)?;
    if files.is_empty() {
        anyhow::bail!("no files found at {}", args.path.display());
    }

    let identity = ReportIdentity::new(&args.callsign, &args.team);
    let mut path = PatrolPath::new(args.lat, args.lon);
    let mut failures = 0usize;

    for file in &files {
        if let Err(e) = assess_one(&args, &client, &identity, &mut path, file).await {
            eprintln!("{}: {e:#}", file.display());
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} file(s) failed", files.len());
    }
    Ok(())
}

async fn assess_one(
    args: &Args,
    client: &VisionClient,
    identity: &ReportIdentity,
    path: &mut PatrolPath,
    file: &Path,
) -> Result<()> {
    let media = MediaFile::load(file).context("unreadable or unsupported media")?;
    let assessment = client.assess(&media).await.context("assessment failed")?;

    println!("{}", file.display());
    println!(
        "{}",
        serde_json::to_string_pretty(&assessment).context("assessment not serializable")?
    );

    let (lat, lon) = path.advance();
    let fix = PositionFix {
        lat,
        lon,
        hae: IMAGERY_HAE,
        ce: IMAGERY_CE,
        le: IMAGERY_LE,
        time: Utc::now(),
    };
    let report = build_report(identity, &assessment, &fix, Utc::now(), args.stale)
        .context("assessment incomplete, cannot build report")?;
    if args.xml {
        println!("{}", serialize_event(&report));
    }
    println!();
    Ok(())
}

/// One file as-is, or every file in a directory in name order.
fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries =
        std::fs::read_dir(path).with_context(|| format!("cannot read {}", path.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}
