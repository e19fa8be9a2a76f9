use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podplay::{
    AudioDevice, AudioSource, Config, DownloadManager, DownloadOutcome, NoopReporter,
    PlayableItem, PlaybackManager, ProgressEvent, ProgressReporter, ReqwestClient,
    SharedProgressReporter, ShuffleStrategy, Shuffler, Storage, load_items,
};

// Emoji with fallback for terminals without Unicode support
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static SHUFFLE: Emoji<'_, '_> = Emoji("🔀 ", "[~] ");

/// Download, order and queue podcast episodes
#[derive(Parser, Debug)]
#[command(name = "podplay")]
#[command(about = "Download, order and queue podcast episodes")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage root (overrides the configuration)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the audio of every item in a JSON item list
    Download {
        /// JSON file with an array of items
        items: PathBuf,

        /// Replace files that are already downloaded
        #[arg(short, long)]
        force: bool,
    },

    /// Print the items in shuffled order
    Shuffle {
        /// JSON file with an array of items
        items: PathBuf,

        /// Shuffle strategy (overrides the configuration)
        #[arg(short, long, value_enum)]
        strategy: Option<ShuffleStrategy>,

        /// Seed for the reproducible strategy
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build a play queue from the items and start the first one
    Queue {
        /// JSON file with an array of items
        items: PathBuf,

        /// Shuffle the items with this strategy before queueing them
        #[arg(short, long, value_enum)]
        strategy: Option<ShuffleStrategy>,

        /// Seed for the reproducible strategy
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    bar_style: ProgressStyle,
}

impl IndicatifReporter {
    fn new() -> Result<Self> {
        let bar_style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .context("Invalid progress bar template")?
            .progress_chars("█▓░");

        Ok(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            bar_style,
        })
    }

    fn get_or_create_bar(&self, guid: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bar) = bars.get(guid) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(self.bar_style.clone());
        bars.insert(guid.to_string(), bar.clone());
        bar
    }

    fn finish_bar(&self, guid: &str) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.remove(guid) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::DownloadStarting {
                guid,
                episode_title,
                content_length,
                ..
            } => {
                let bar = self.get_or_create_bar(&guid);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(truncate_title(&episode_title, 40));
            }

            ProgressEvent::DownloadProgress {
                guid,
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(&guid);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::Finalizing {
                guid,
                episode_title,
            } => {
                let bar = self.get_or_create_bar(&guid);
                bar.set_message(format!("{} (saving)", truncate_title(&episode_title, 30)));
            }

            ProgressEvent::DownloadCompleted {
                guid,
                episode_title,
                path,
                ..
            } => {
                let _ = self.multi.println(format!(
                    "{SUCCESS}{} {}",
                    truncate_title(&episode_title, 40).green(),
                    path.display().to_string().dimmed()
                ));
                self.finish_bar(&guid);
            }

            ProgressEvent::DownloadFailed {
                guid,
                episode_title,
                error,
            } => {
                let bar = self.get_or_create_bar(&guid);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
                self.finish_bar(&guid);
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                let _ = self.multi.println(format!(
                    "{BROOM}Removed {} leftover partial file(s)",
                    count.to_string().yellow()
                ));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load configuration")?,
        None => Config::default(),
    };
    if let Some(root) = &args.root {
        config.storage.root = Some(root.clone());
    }
    Ok(config)
}

fn build_downloads(
    config: &Config,
    reporter: SharedProgressReporter,
) -> Result<DownloadManager<ReqwestClient>> {
    let client =
        ReqwestClient::from_config(&config.transport).context("Failed to build HTTP client")?;
    let storage = Storage::new(config.storage.root_dir())
        .with_downloads_dir(config.storage.downloads_dir.clone());

    let downloads = DownloadManager::new(client, storage, reporter);
    downloads
        .cleanup_partials()
        .context("Failed to clean up partial downloads")?;
    Ok(downloads)
}

async fn download(
    downloads: &DownloadManager<ReqwestClient>,
    items: &[Arc<PlayableItem>],
    force: bool,
    quiet: bool,
) -> Result<()> {
    let results = join_all(
        items
            .iter()
            .map(|item| downloads.schedule_download(item, force)),
    )
    .await;

    let (mut downloaded, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for result in &results {
        match result {
            Ok(DownloadOutcome::Downloaded { .. } | DownloadOutcome::Joined { .. }) => {
                downloaded += 1
            }
            Ok(DownloadOutcome::AlreadyPresent | DownloadOutcome::NoAudioUrl) => skipped += 1,
            Err(_) => failed += 1,
        }
    }

    if !quiet {
        println!(
            "\n{PARTY}{} {} downloaded, {} skipped, {} failed",
            "Done:".bold().green(),
            downloaded.to_string().green().bold(),
            skipped.to_string().yellow(),
            if failed > 0 {
                failed.to_string().red().bold()
            } else {
                failed.to_string().green()
            }
        );
        println!(
            "{FOLDER}Output: {}\n",
            downloads.storage().downloads_dir().display().to_string().cyan()
        );
    }

    if failed > 0 && downloaded == 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_shuffled(items: Vec<Arc<PlayableItem>>, shuffler: &Shuffler) {
    if let Some(seed) = shuffler.seed() {
        println!("{SHUFFLE}Seed: {}", seed.to_string().cyan());
    }
    for (position, item) in shuffler.shuffle(items).iter().enumerate() {
        println!(
            "{:>4}  {}  {}",
            (position + 1).to_string().dimmed(),
            item.title().bold(),
            item.guid().dimmed()
        );
    }
}

async fn queue(
    downloads: DownloadManager<ReqwestClient>,
    config: &Config,
    items: Vec<Arc<PlayableItem>>,
    shuffler: Option<Shuffler>,
) -> Result<()> {
    let items = match shuffler {
        Some(shuffler) => shuffler.shuffle(items),
        None => items,
    };

    let session = AudioDevice::system().session();
    let player = PlaybackManager::new(
        Arc::new(downloads),
        Box::new(session),
        config.playback.clone(),
    );

    player
        .enqueue_all(&items)
        .await
        .context("Failed to build the play queue")?;
    player.play().await.context("Failed to start playback")?;

    let guids = player.queue_guids().await;
    if let Some(source) = player.current_source().await {
        let origin = match source {
            AudioSource::Local(path) => path.display().to_string(),
            AudioSource::Stream(url) => url.to_string(),
        };
        println!(
            "{HEADPHONES}{} {} ({})",
            player.state().to_string().green().bold(),
            guids.first().map(String::as_str).unwrap_or_default().bold(),
            origin.dimmed()
        );
    }
    for (position, guid) in guids.iter().enumerate().skip(1) {
        println!("{:>4}  {}", position.to_string().dimmed(), guid);
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podplay=warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_items(path: &Path) -> Result<Vec<Arc<PlayableItem>>> {
    load_items(path).with_context(|| format!("Failed to read items from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = load_config(&args)?;

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new()?)
    };

    match &args.command {
        Command::Download { items, force } => {
            let items = read_items(items)?;
            let downloads = build_downloads(&config, reporter)?;
            download(&downloads, &items, *force, args.quiet).await
        }
        Command::Shuffle {
            items,
            strategy,
            seed,
        } => {
            let items = read_items(items)?;
            let shuffler = Shuffler::new(
                strategy.unwrap_or(config.shuffle.strategy),
                seed.or(config.shuffle.seed),
            );
            print_shuffled(items, &shuffler);
            Ok(())
        }
        Command::Queue {
            items,
            strategy,
            seed,
        } => {
            let items = read_items(items)?;
            let shuffler = strategy
                .map(|strategy| Shuffler::new(strategy, seed.or(config.shuffle.seed)));
            let downloads = build_downloads(&config, reporter)?;
            queue(downloads, &config, items, shuffler).await
        }
    }
}
