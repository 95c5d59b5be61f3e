//! mediaqueue - queued media downloads driven by yt-dlp
//!
//! Headless front end for the download queue: probe a URL, queue and run
//! downloads one at a time, or check the external tools.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mediaqueue::credentials::{clear_cookie_cache, import_cookie_file, ProfileStore};
use mediaqueue::queue::{DownloadTask, NewTask, TaskQueue, TaskStatus};
use mediaqueue::scheduler::{Orchestrator, SchedulerConfig};
use mediaqueue::utils::bundle_paths::cookie_cache_dir;
use mediaqueue::utils::config::{default_config_path, AppSettings, ConfigFile};
use mediaqueue::utils::BinaryPaths;
use mediaqueue::{CredentialSource, DownloadEngine, YtDlpExtractor};
use path_absolutize::Absolutize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mediaqueue", version, about = "Queue media downloads through yt-dlp")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch video information without downloading
    Probe {
        url: String,
        /// Netscape cookie file to use for this site
        #[arg(long)]
        cookies: Option<PathBuf>,
        /// Print the raw video information as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue one or more downloads and run them to completion
    Download {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Output directory (defaults to the configured download location)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// yt-dlp format selector
        #[arg(short, long)]
        format: Option<String>,
        /// Extract audio as mp3
        #[arg(long)]
        audio_only: bool,
        #[arg(long)]
        cookies: Option<PathBuf>,
        #[arg(long, default_value_t = mediaqueue::queue::DEFAULT_MAX_RETRIES)]
        max_retries: u32,
    },
    /// Report whether yt-dlp and ffmpeg are available
    Check,
    /// Remove cached cookie files
    ClearCookies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let settings = AppSettings::load_or_default(&config_path);
    let binaries = BinaryPaths::resolve(settings.binaries_dir.as_deref());

    match args.command {
        Command::Probe { url, cookies, json } => {
            let credentials = credential_store(&settings, cookies.as_deref(), &url)?;
            let extractor = YtDlpExtractor::new(&binaries.ytdlp, Arc::new(ConfigFile::new(&config_path)));
            let info = extractor.probe(&url, &credentials.resolve(&url)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Title: {}", info.title);
                println!("Uploader: {}", info.uploader.as_deref().unwrap_or("-"));
                println!("Duration: {:?}", info.duration);
                for format in info.combined_formats() {
                    println!(
                        "  {:>8}  {:<5} {:<12} {}",
                        format.format_id,
                        format.ext,
                        format.resolution.as_deref().unwrap_or("-"),
                        format.format_note.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Command::Download {
            urls,
            output,
            format,
            audio_only,
            cookies,
            max_retries,
        } => {
            let output_dir = output_directory(output.as_deref().unwrap_or(settings.download_location.as_path()))?;
            let first_url = urls.first().cloned().unwrap_or_default();
            let credentials = credential_store(&settings, cookies.as_deref(), &first_url)?;
            let engine = DownloadEngine::new(binaries, Arc::new(ConfigFile::new(&config_path)));

            let queue = Arc::new(TaskQueue::new());
            let orchestrator = Orchestrator::attach(
                Arc::clone(&queue),
                Arc::new(engine),
                Arc::new(credentials),
                SchedulerConfig::default(),
            );
            let subscription = queue.subscribe(progress_printer());

            for url in urls {
                let mut task = NewTask::new(url, &output_dir)
                    .audio_only(audio_only)
                    .max_retries(max_retries);
                if let Some(format) = &format {
                    task = task.format(format.clone());
                }
                orchestrator.enqueue(task)?;
            }

            let failed = tokio::select! {
                failed = wait_for_queue(&queue) => failed,
                _ = tokio::signal::ctrl_c() => {
                    println!("Interrupted, stopping current download");
                    orchestrator.shutdown();
                    bail!("interrupted");
                }
            };
            subscription.unsubscribe();

            if failed > 0 {
                bail!("{} download(s) failed", failed);
            }
            println!("All downloads completed");
        }
        Command::Check => {
            let status = binaries.check();
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !(status.ytdlp && status.ffmpeg) {
                bail!("required binaries are missing");
            }
        }
        Command::ClearCookies => {
            let removed = clear_cookie_cache(&cookie_cache_dir())?;
            println!("Removed {} cached cookie file(s)", removed);
        }
    }

    Ok(())
}

/// Absolute output directory, created if needed.
fn output_directory(dir: &Path) -> Result<PathBuf> {
    let dir = dir.absolutize()?.into_owned();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Profile store holding the imported cookie file, if one was given.
fn credential_store(settings: &AppSettings, cookies: Option<&Path>, url: &str) -> Result<ProfileStore> {
    let mut store = ProfileStore::new();
    if settings.ytdlp.use_browser_cookies {
        store = store.with_browser_fallback(settings.ytdlp.browser.clone());
    }

    if let Some(source) = cookies {
        let domain = host_of(url).unwrap_or("default");
        let cached = import_cookie_file(source, domain, &cookie_cache_dir())?;
        let profile = store.add_profile(domain, domain, cached);
        store.activate(&profile.id)?;
    }

    Ok(store)
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().filter(|host| !host.is_empty())
}

/// Print status changes and whole-percent progress steps.
fn progress_printer() -> impl Fn(&[DownloadTask]) + Send + Sync + 'static {
    let seen: Mutex<HashMap<String, (TaskStatus, u32)>> = Mutex::new(HashMap::new());
    move |tasks: &[DownloadTask]| {
        let mut seen = seen.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks {
            let step = (task.status, task.progress.floor() as u32);
            if seen.get(&task.id) == Some(&step) {
                continue;
            }
            seen.insert(task.id.clone(), step);
            match task.status {
                TaskStatus::Failed => println!(
                    "[{}] failed: {}",
                    task.title,
                    task.error.as_deref().unwrap_or("unknown error")
                ),
                TaskStatus::Downloading => println!("[{}] {:.1}%", task.title, task.progress),
                status => println!("[{}] {}", task.title, status),
            }
        }
    }
}

/// Wait until every task is finished; returns the number that failed.
async fn wait_for_queue(queue: &TaskQueue) -> usize {
    loop {
        let tasks = queue.list_all();
        let finished = tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed));
        if finished {
            return tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
