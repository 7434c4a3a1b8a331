use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mlscull::{
    CullSession, CullSessionResult, DEFAULT_TARGET_COUNT, GeminiOracle, RoomType, SessionConfig,
};

#[derive(Parser, Debug)]
#[command(name = "mlscull", version, about = "Triage listing photos for MLS submission")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score, de-duplicate, select and order a photo batch
    Cull {
        /// File listing photo URLs, one per line
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// How many photos to keep
        #[arg(short, long, default_value_t = DEFAULT_TARGET_COUNT)]
        target: usize,
        /// Write the full session result as JSON
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Override the Gemini model name
        #[arg(long)]
        model: Option<String>,
        /// Photos per oracle call
        #[arg(long, default_value_t = mlscull::CHUNK_SIZE)]
        chunk_size: usize,
        /// Pause between oracle calls, in milliseconds
        #[arg(long, default_value_t = 1000)]
        chunk_delay_ms: u64,
    },

    /// Print the room-type priority and coverage tables
    Rooms,
}

#[derive(Serialize)]
struct CullReport {
    generated_at: String,
    target_count: usize,
    result: CullSessionResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mlscull=warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Cull {
            input,
            target,
            out,
            model,
            chunk_size,
            chunk_delay_ms,
        } => run_cull(input, target, out, model, chunk_size, chunk_delay_ms).await,
        Commands::Rooms => {
            print_rooms();
            Ok(())
        }
    }
}

async fn run_cull(
    input: PathBuf,
    target: usize,
    out: Option<PathBuf>,
    model: Option<String>,
    chunk_size: usize,
    chunk_delay_ms: u64,
) -> Result<()> {
    let photo_urls = read_url_file(&input)?;
    println!(
        "▶ Culling {} photos down to {} (chunks of {})",
        photo_urls.len(),
        target,
        chunk_size
    );

    let api_key = std::env::var("GEMINI_API_KEY")
        .context("GEMINI_API_KEY must be set to reach the scoring oracle")?;
    let mut oracle = GeminiOracle::new(api_key);
    if let Some(model) = model {
        oracle = oracle.with_model(model);
    }

    let session = CullSession::with_config(oracle, SessionConfig {
        chunk_size,
        chunk_delay: Duration::from_millis(chunk_delay_ms),
        ..SessionConfig::default()
    });

    // Ctrl-C degrades remaining chunks to default scores instead of aborting.
    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("▶ Interrupt received, finishing with default scores...");
            handler.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("scoring photos");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = session
        .run_with_cancellation(&photo_urls, target, cancel)
        .await?;
    spinner.finish_and_clear();

    print_summary(&result);

    if let Some(out) = out {
        let report = CullReport {
            generated_at: Utc::now().to_rfc3339(),
            target_count: target,
            result,
        };
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&out, json)
            .with_context(|| format!("failed to write report to {}", out.display()))?;
        println!("▶ Report written to {}", out.display());
    }

    Ok(())
}

fn read_url_file(path: &PathBuf) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list {}", path.display()))?;
    let urls: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect();
    Ok(urls)
}

fn print_summary(result: &CullSessionResult) {
    println!(
        "▶ Selected {} of {} photos ({} duplicate group(s), avg quality {:.1}, {} ms)",
        result.selected_photos.len(),
        result.total_photos,
        result.duplicate_groups.len(),
        result.average_quality,
        result.processing_time_ms,
    );
    for photo in &result.selected_photos {
        println!(
            "  {:>3}. [{}] q={} #{} {}",
            photo.recommended_order.unwrap_or(0),
            photo.room_type,
            photo.quality_score,
            photo.photo_index,
            photo.selection_reason,
        );
    }
}

fn print_rooms() {
    println!("Presentation order (lower shows first):");
    let mut rooms: Vec<RoomType> = RoomType::all().collect();
    rooms.sort_by_key(|r| r.presentation_priority());
    for room in &rooms {
        println!("  {:>2}  {}", room.presentation_priority(), room);
    }
    println!("\nRequired coverage, in fill order:");
    for room in RoomType::REQUIRED_COVERAGE {
        println!("  {room}");
    }
}
