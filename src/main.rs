use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podgen::{
    App, Config, Engine, NoopReporter, ProgressEvent, ProgressReporter, RecordStore, RunPlan,
    SharedProgressReporter, select_podcasts,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[^] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static TRASH: Emoji<'_, '_> = Emoji("🗑️  ", "[-] ");
static REWIND: Emoji<'_, '_> = Emoji("⏪ ", "[<] ");
static PICTURE: Emoji<'_, '_> = Emoji("🖼️  ", "[i] ");
static FEED: Emoji<'_, '_> = Emoji("📡 ", "[>] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Publish locally recorded podcast episodes to object storage
#[derive(Parser, Debug)]
#[command(name = "podgen")]
#[command(about = "Publish locally recorded podcast episodes and their feeds")]
#[command(version)]
struct Args {
    /// Config file (YAML)
    #[arg(short, long, env = "PODGEN_CONF", default_value = "podgen.yml")]
    conf: PathBuf,

    /// Record store database file, overrides `db` from the config
    #[arg(short, long, env = "PODGEN_DB")]
    db: Option<PathBuf>,

    /// Find and record new episodes
    #[arg(short, long)]
    scan: bool,

    /// Delete old episodes, upload new ones and regenerate feeds
    #[arg(short, long)]
    upload: bool,

    /// Regenerate feeds
    #[arg(short, long)]
    feed: bool,

    /// Re-upload podcast cover images
    #[arg(short, long)]
    image: bool,

    /// Podcast ids, comma separated
    #[arg(short, long)]
    podcast: Option<String>,

    /// Process all configured podcasts
    #[arg(short, long)]
    all: bool,

    /// Roll back the most recent delete
    #[arg(short, long)]
    rollback: bool,

    /// Roll back every episode of a session
    #[arg(long, value_name = "SESSION")]
    rollback_session: Option<String>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log engine activity (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn plan(&self) -> RunPlan {
        RunPlan {
            scan: self.scan,
            upload: self.upload,
            feed: self.feed,
            image: self.image,
            rollback: self.rollback,
            rollback_session: self.rollback_session.clone(),
        }
    }
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<(String, usize), ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(spinner_style("{spinner:.green} {wide_msg}"));
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<(String, usize), ProgressBar>> {
        self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_bar(&self, podcast_id: &str, slot: usize, message: String) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style(&format!("  {UPLOAD}{{spinner:.cyan}} {{wide_msg}}")));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(message);

        if let Some(previous) = self.bars().insert((podcast_id.to_string(), slot), bar) {
            previous.finish_and_clear();
        }
    }

    fn take_bar(&self, podcast_id: &str, slot: usize) -> Option<ProgressBar> {
        self.bars().remove(&(podcast_id.to_string(), slot))
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ScanCompleted {
                podcast_id,
                discovered,
            } => {
                self.println(format!(
                    "{SEARCH}{} {} new episodes",
                    podcast_id.bold(),
                    discovered.to_string().cyan()
                ));
            }

            ProgressEvent::UploadPlanned {
                podcast_id,
                session,
                episodes,
                total_bytes,
                chunks,
            } => {
                self.main_bar.set_message(format!(
                    "{} • uploading {} episodes ({}) in {} chunks, session {}",
                    podcast_id.bold().green(),
                    episodes.to_string().cyan(),
                    HumanBytes(total_bytes),
                    chunks.to_string().cyan(),
                    session.dimmed()
                ));
            }

            ProgressEvent::UploadStarting {
                podcast_id,
                slot,
                filename,
                size,
            } => {
                let message = format!(
                    "[{}] {} ({})",
                    podcast_id.cyan(),
                    truncate(&filename, 40),
                    HumanBytes(size)
                );
                self.start_bar(&podcast_id, slot, message);
            }

            ProgressEvent::UploadCompleted {
                podcast_id,
                slot,
                filename,
                reused,
                ..
            } => {
                if let Some(bar) = self.take_bar(&podcast_id, slot) {
                    bar.finish_and_clear();
                }
                let note = if reused { " (already uploaded)" } else { "" };
                self.println(format!(
                    "  {SUCCESS}{}{}",
                    truncate(&filename, 50).green(),
                    note.dimmed()
                ));
            }

            ProgressEvent::UploadFailed {
                podcast_id,
                slot,
                filename,
                error,
            } => {
                if let Some(bar) = self.take_bar(&podcast_id, slot) {
                    bar.finish_and_clear();
                }
                self.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate(&filename, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::ChunkCompleted {
                podcast_id,
                chunk_index,
                total_chunks,
                failed,
                ..
            } => {
                self.main_bar.set_message(format!(
                    "{} • chunk {}/{} done{}",
                    podcast_id.bold().green(),
                    (chunk_index + 1).to_string().cyan(),
                    total_chunks.to_string().cyan(),
                    if failed > 0 {
                        format!(", {} failed", failed).red().to_string()
                    } else {
                        String::new()
                    }
                ));
            }

            ProgressEvent::EpisodeDeleted {
                podcast_id,
                filename,
            } => {
                self.println(format!(
                    "{TRASH}[{}] {}",
                    podcast_id.cyan(),
                    truncate(&filename, 50).yellow()
                ));
            }

            ProgressEvent::DeleteFailed {
                podcast_id,
                filename,
                error,
            } => {
                self.println(format!(
                    "{FAILURE}[{}] {} - {}",
                    podcast_id.cyan(),
                    truncate(&filename, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::RollbackCompleted {
                podcast_id,
                session,
                restored,
            } => {
                let scope = session
                    .map(|s| format!(" (session {})", s))
                    .unwrap_or_default();
                self.println(format!(
                    "{REWIND}{} {} episodes restored{}",
                    podcast_id.bold(),
                    restored.to_string().cyan(),
                    scope.dimmed()
                ));
            }

            ProgressEvent::ImagePublished {
                podcast_id,
                location,
            } => {
                self.println(format!(
                    "{PICTURE}{} {}",
                    podcast_id.bold(),
                    location.cyan()
                ));
            }

            ProgressEvent::FeedPublished {
                podcast_id,
                location,
            } => {
                self.println(format!("{FEED}{} {}", podcast_id.bold(), location.cyan()));
            }
        }
    }
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn truncate(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let kept: String = name.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podgen".bold().magenta(),
            format!("{} - Podcast Publisher", env!("CARGO_PKG_VERSION")).dimmed()
        );
    }

    let config_path = Config::locate(&args.conf).context("Config file not found")?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Can't load config {}", config_path.display()))?;
    config
        .ensure_storage()
        .context("Storage folder not found")?;

    let podcasts = select_podcasts(&config, args.podcast.as_deref(), args.all)
        .context("Failed to select podcasts")?;

    let db_path = config
        .database_path(args.db.as_deref())
        .context("You didn't set a record store database")?;
    let store = RecordStore::open(&db_path)
        .with_context(|| format!("Can't open record store {}", db_path.display()))?;

    let objects = config
        .object_store()
        .context("Can't create object store client")?;

    let progress = (!args.quiet).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &progress {
        Some(progress) => progress.clone(),
        None => NoopReporter::shared(),
    };

    let engine = Engine::new(Arc::new(store), objects, config.storage.folder.clone())
        .with_chunk_size(config.upload.chunk_size())
        .with_reporter(reporter);
    let app = App::new(engine, podcasts);

    let result = app.run(&args.plan()).await;

    if let Some(progress) = &progress {
        progress.finish();
    }

    let report = result.context("Run aborted")?;

    if !args.quiet {
        if let Some(session) = &report.session {
            println!("\n{}{}", "Session: ".dimmed(), session.cyan());
        }

        println!(
            "\n{PARTY}{} {} new, {} uploaded, {} deleted, {} restored, {} feeds, {} failed",
            "Done:".bold().green(),
            report.discovered.to_string().cyan(),
            report.uploaded.to_string().green().bold(),
            report.deleted.to_string().yellow(),
            report.restored.to_string().yellow(),
            report.feeds.len().to_string().cyan(),
            if report.has_failures() {
                report.failures.len().to_string().red().bold()
            } else {
                report.failures.len().to_string().green()
            }
        );

        if report.has_failures() {
            println!("\n{}", "Failures:".red().bold());
            for failure in &report.failures {
                let subject = match &failure.filename {
                    Some(filename) => format!("{}/{}", failure.podcast_id, filename),
                    None => failure.podcast_id.clone(),
                };
                println!("  {}{} - {}", CROSS, subject.yellow(), failure.error.dimmed());
            }
        }
        println!();
    }

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}
