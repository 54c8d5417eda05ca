use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use podshelf::{
    ActionReport, BulkAction, CompletedDownloadsScreen, DirectoryStore, EpisodeEntry, EventBus,
    LibraryActions, ListView, PlaybackPosition, PointAction, Received, ScreenHandle,
    StoreOptions, command_channel,
};

// Emoji with fallback for terminals without Unicode support
static SHELF: Emoji<'_, '_> = Emoji("📚 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static EMPTY: Emoji<'_, '_> = Emoji("📭 ", "[-] ");
static PLAYING: Emoji<'_, '_> = Emoji("▶️  ", "> ");
static REMOVED: Emoji<'_, '_> = Emoji("🗑️  ", "[x] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Browse and manage completed podcast downloads
#[derive(Parser, Debug)]
#[command(name = "podshelf")]
#[command(about = "Browse and manage completed podcast downloads")]
#[command(version)]
struct Args {
    /// Library directory (a podpull output directory, or a directory of them)
    library: PathBuf,

    /// Verify audio files against their recorded content hash
    #[arg(long)]
    verify: bool,

    /// Delete the audio of every completed download
    #[arg(long, conflicts_with_all = ["enqueue_all", "delete"])]
    delete_all: bool,

    /// Add every completed download to the playback queue
    #[arg(long, conflicts_with = "delete")]
    enqueue_all: bool,

    /// Delete the audio of the episode listed at this row (1-based)
    #[arg(short, long, value_name = "ROW")]
    delete: Option<usize>,

    /// Keep the list open and read commands from stdin
    #[arg(short, long, conflicts_with_all = ["delete_all", "enqueue_all", "delete"])]
    watch: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Terminal rendering of the completed downloads list
struct TerminalView {
    rows: Vec<EpisodeEntry>,
    spinner: Option<ProgressBar>,
    quiet: bool,
}

impl TerminalView {
    fn new(quiet: bool) -> Self {
        Self {
            rows: Vec::new(),
            spinner: None,
            quiet,
        }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => println!("{line}"),
        }
    }

    fn format_row(index: usize, entry: &EpisodeEntry) -> String {
        let marker = if entry.playing {
            PLAYING.to_string()
        } else {
            String::new()
        };

        let title = if entry.played {
            entry.title.dimmed()
        } else {
            entry.title.bold()
        };

        let mut line = format!(
            "{:>4}. {}{} {} {}",
            (index + 1).to_string().cyan(),
            marker,
            title,
            "•".dimmed(),
            entry.podcast_title.green()
        );

        if entry.position.position_secs > 0 {
            line.push_str(&format!(" [{}]", entry.position.to_string().yellow()));
            if let Some(fraction) = entry.position.fraction() {
                let percent = format!("{:.0}%", fraction * 100.0);
                line.push_str(&format!(" {}", percent.dimmed()));
            }
        }
        if entry.queued {
            line.push_str(&format!(" {}", "queued".magenta()));
        }
        line
    }

    fn print_rows(&self) {
        for (index, entry) in self.rows.iter().enumerate() {
            self.println(Self::format_row(index, entry));
        }
    }
}

impl ListView for TerminalView {
    fn set_loading(&mut self, loading: bool) {
        if self.quiet {
            return;
        }
        if loading {
            if self.spinner.is_none() {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {wide_msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(format!("{SEARCH}Loading completed downloads"));
                spinner.enable_steady_tick(std::time::Duration::from_millis(100));
                self.spinner = Some(spinner);
            }
        } else if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn set_empty_visible(&mut self, visible: bool) {
        if visible {
            self.println(format!(
                "{EMPTY}{}\n    {}",
                "No completed downloads".bold(),
                "Episodes show up here once their audio has finished downloading.".dimmed()
            ));
        }
    }

    fn set_actions_available(&mut self, available: bool) {
        if available {
            self.println(format!(
                "\n{} episode(s) downloaded",
                self.rows.len().to_string().bold()
            ));
        }
    }

    fn items_replaced(&mut self, entries: &[EpisodeEntry]) {
        self.rows = entries.to_vec();
        self.print_rows();
    }

    fn item_changed(&mut self, index: usize, entry: &EpisodeEntry) {
        if let Some(row) = self.rows.get_mut(index) {
            *row = entry.clone();
            self.println(Self::format_row(index, entry));
        }
    }

    fn item_removed(&mut self, index: usize) {
        if index < self.rows.len() {
            let entry = self.rows.remove(index);
            self.println(format!("      {REMOVED}{}", entry.title.red()));
        }
    }

    fn position_updated(&mut self, index: usize, position: &PlaybackPosition) {
        if let Some(row) = self.rows.get_mut(index) {
            row.position = *position;
        }
    }
}

/// A line typed in watch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchCommand {
    Refresh,
    Bulk(BulkAction),
    Point(usize, PointAction),
    Quit,
}

fn parse_watch_command(line: &str) -> Option<WatchCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let row = parts
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1));

    match (verb, row) {
        ("r", None) => Some(WatchCommand::Refresh),
        ("q", None) => Some(WatchCommand::Quit),
        ("D", None) => Some(WatchCommand::Bulk(BulkAction::Delete)),
        ("E", None) => Some(WatchCommand::Bulk(BulkAction::Enqueue)),
        ("d", Some(row)) => Some(WatchCommand::Point(row, PointAction::Delete)),
        ("e", Some(row)) => Some(WatchCommand::Point(row, PointAction::Enqueue)),
        ("p", Some(row)) => Some(WatchCommand::Point(row, PointAction::MarkPlayed)),
        _ => None,
    }
}

async fn read_watch_commands(handle: ScreenHandle) -> Result<()> {
    println!(
        "{}",
        "Commands: r refresh, d N delete, e N enqueue, p N mark played, D delete all, E enqueue all, q quit"
            .dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let sent = match parse_watch_command(&line) {
            Some(WatchCommand::Quit) => break,
            Some(WatchCommand::Refresh) => handle.refresh().await,
            Some(WatchCommand::Bulk(action)) => handle.bulk(action).await,
            Some(WatchCommand::Point(row, action)) => handle.point(row, action).await,
            None => {
                println!("{}", format!("Unknown command: {line}").red());
                Ok(())
            }
        };
        if sent.is_err() {
            break;
        }
    }

    // The screen may already have stopped
    let _ = handle.close().await;
    Ok(())
}

fn print_report(report: &ActionReport, quiet: bool) {
    if quiet {
        return;
    }
    if !report.succeeded.is_empty() {
        println!(
            "\n{SUCCESS}{} episode(s) updated",
            report.succeeded.len().to_string().green().bold()
        );
    }
    if !report.failed.is_empty() {
        println!("\n{}", "Failed episodes:".red().bold());
        for (id, error) in &report.failed {
            println!(
                "  {}{} - {}",
                CROSS,
                id.to_string().yellow(),
                error.dimmed()
            );
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            SHELF,
            "podshelf".bold().magenta(),
            "- Completed Downloads".dimmed()
        );
    }

    let bus = EventBus::new();
    let store = DirectoryStore::with_options(
        &args.library,
        StoreOptions {
            verify_hashes: args.verify,
        },
    );
    let actions = Arc::new(LibraryActions::new(store.clone(), bus.clone()));
    let mut screen = CompletedDownloadsScreen::new(
        Arc::new(store),
        actions.clone(),
        actions.clone(),
        TerminalView::new(args.quiet),
    );

    if args.watch {
        let (handle, commands) = command_channel(16);
        let screen_task = tokio::spawn(screen.run(bus.clone(), commands));
        read_watch_commands(handle).await?;
        screen_task.await.context("Screen task failed")?;
        return Ok(());
    }

    // One-shot: load, apply the requested action, and reconcile the list
    // with whatever the action announced on the bus.
    let mut subscription = bus.subscribe();
    screen.refresh();
    screen.settle().await;

    let Some(entries) = screen.entries().map(<[EpisodeEntry]>::to_vec) else {
        bail!(
            "Could not load completed downloads from {}",
            args.library.display()
        );
    };

    let report = if args.delete_all {
        Some(actions.delete_now(&entries).await)
    } else if args.enqueue_all {
        Some(actions.enqueue_now(&entries).await)
    } else if let Some(row) = args.delete {
        let entry = row
            .checked_sub(1)
            .and_then(|index| entries.get(index))
            .with_context(|| format!("No episode at row {row}"))?;
        Some(actions.delete_now(std::slice::from_ref(entry)).await)
    } else {
        None
    };

    let Some(report) = report else {
        return Ok(());
    };

    while let Some(received) = subscription.try_recv() {
        match received {
            Received::Event(event) => screen.handle_event(event),
            Received::Lagged(_) => screen.refresh(),
            Received::Closed => break,
        }
    }
    screen.settle().await;
    drop(subscription);

    print_report(&report, args.quiet);

    if !report.failed.is_empty() && report.succeeded.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
