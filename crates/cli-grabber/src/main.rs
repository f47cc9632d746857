mod console;

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grabber::{
    workspace, ChatUpdate, Downloader, GrabberConfig, JobOutcome, MessageHandler, SweepPolicy,
};
use log::{info, warn, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};
use console::ConsoleClient;

/// Download a video, shrink it under the upload limit and hand it over
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the scratch directory
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Override the per-process timeout
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a single URL
    Fetch {
        url: String,

        /// Where the delivered video is placed
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Treat every stdin line as a chat message, one job at a time
    Chat {
        #[arg(short, long, default_value = "./delivered")]
        output_dir: PathBuf,

        #[arg(long, default_value_t = 1)]
        chat_id: i64,
    },
    /// Remove leftovers of interrupted jobs and exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG takes precedence over --verbose
    env_logger::Builder::new()
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let cfg = load_config(&args).context("Failed to load configuration")?;

    info!("Grabber starting");
    info!("  Work dir: {}", cfg.work_dir.display());
    info!("  Downloader: {}", cfg.downloader_bin.display());
    info!("  Transcoder: {} (crf {}, preset {})", cfg.ffmpeg_bin.display(), cfg.crf, cfg.preset);
    info!("  Timeout: {}s per process", cfg.timeout_secs);
    info!("  Upload limit: {} bytes", cfg.max_upload_bytes);

    match args.command {
        Command::Sweep => sweep(&cfg).await,
        Command::Fetch { url, output_dir } => {
            let handler = build_handler(&cfg, output_dir);
            let outcome = handler.handle(&ChatUpdate::text(0, url)).await;
            report(&outcome);
            if outcome.is_delivered() {
                Ok(())
            } else {
                anyhow::bail!("Video was not delivered")
            }
        }
        Command::Chat { output_dir, chat_id } => {
            sweep(&cfg).await?;
            let handler = build_handler(&cfg, output_dir);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
                if line.trim().is_empty() {
                    continue;
                }
                let outcome = handler.handle(&ChatUpdate::text(chat_id, line)).await;
                report(&outcome);
            }
            info!("Input closed, shutting down");
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<GrabberConfig> {
    let mut cfg = GrabberConfig::load_config(args.config.as_deref())?;
    if let Some(dir) = &args.work_dir {
        cfg.work_dir = dir.clone();
    }
    if let Some(secs) = args.timeout_secs {
        cfg.timeout_secs = secs;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Remove leftovers of interrupted jobs. One-shot fetches skip this so they
/// never race a job running in another process.
async fn sweep(cfg: &GrabberConfig) -> Result<()> {
    let swept = workspace::sweep_orphans(&cfg.work_dir, SweepPolicy::from_config(cfg))
        .await
        .with_context(|| format!("Failed to sweep work directory: {}", cfg.work_dir.display()))?;
    if swept > 0 {
        info!("✅ Removed {} orphaned item(s) from a previous run", swept);
    }
    Ok(())
}

fn build_handler(cfg: &GrabberConfig, output_dir: PathBuf) -> MessageHandler<ConsoleClient> {
    MessageHandler::new(
        Downloader::from_config(cfg),
        ConsoleClient::new(output_dir),
        cfg.max_upload_bytes,
    )
}

fn report(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Delivered { bytes } => info!("✅ Delivered ({} bytes)", bytes),
        JobOutcome::TooLarge { bytes } => warn!("❌ Too large for upload ({} bytes)", bytes),
        JobOutcome::Failed { reason } => warn!("❌ Job failed: {}", reason),
        other => log::debug!("Outcome: {:?}", other),
    }
}
