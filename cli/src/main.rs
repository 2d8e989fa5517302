//! ECA rewrite CLI - stream a model rewrite of part of a file.
//!
//! # Architecture
//!
//! The CLI is a minimal host for [`eca_rewrite`]: the file is loaded into a
//! [`MemoryWorkspace`], the ECA server is spawned over stdio, and a
//! [`RewriteDriver`] runs the session while this binary plays the user.
//!
//! ```text
//! main() -> EcaServer::start() -> RewriteManager::create()
//!                                        |
//!                                        v
//!                     join!(RewriteDriver::run(), host loop)
//!                                        |
//!                                        v
//!                     Finished -> Accept | Reject -> write file
//! ```
//!
//! Notices and lifecycle changes are reported on stderr so stdout stays free
//! for `--dry-run` output. Ctrl-C rejects the running rewrite.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use eca_config::{EcaConfig, eca_home, load_last_prompt, persist_last_prompt};
use eca_rewrite::{
    EditSurface, HostEvent, Lifecycle, MemoryDocument, MemoryWorkspace, Notice, NoticeLevel,
    RewriteDriver, RewriteInput, RewriteManager, RewriteSettings, RewriteTrigger, SessionUpdate,
    Workspace,
};
use eca_rpc::{EcaServer, path_to_file_uri};
use eca_types::{DocumentUri, Position, RewriteId, TextRange};
use eca_utils::{AtomicWriteOptions, PersistMode, atomic_write};

const INPUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "eca-rewrite", version, about = "Rewrite part of a file with ECA")]
struct Cli {
    /// File to rewrite in place.
    file: PathBuf,

    /// What to do with the selection. Defaults to the last prompt used.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Whole lines to rewrite, 1-based and inclusive.
    #[arg(long, value_name = "FIRST:LAST", conflicts_with_all = ["start", "end"])]
    lines: Option<LineSelection>,

    /// Char offset where the selection starts.
    #[arg(long, requires = "end")]
    start: Option<usize>,

    /// Char offset where the selection ends (exclusive).
    #[arg(long, requires = "start")]
    end: Option<usize>,

    /// Put the original text back once the rewrite finishes.
    #[arg(long)]
    reject: bool,

    /// Print the rewritten file instead of saving it.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineSelection {
    first: u32,
    last: u32,
}

impl FromStr for LineSelection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (first, last) = value.split_once(':').unwrap_or((value, value));
        let parse = |raw: &str| -> Result<u32, String> {
            match raw.trim().parse::<u32>() {
                Ok(0) | Err(_) => Err(format!("invalid line number: {raw:?}")),
                Ok(line) => Ok(line),
            }
        };
        let (first, last) = (parse(first)?, parse(last)?);
        if first > last {
            return Err(format!("line range {first}:{last} is reversed"));
        }
        Ok(Self { first, last })
    }
}

impl Cli {
    fn selection(&self, doc: &MemoryDocument) -> Result<TextRange> {
        match (self.lines, self.start, self.end) {
            (Some(lines), _, _) => {
                let start = doc.offset_at(Position::new(lines.first - 1, 0));
                let end = doc.offset_at(Position::new(lines.last, 0));
                Ok(TextRange::new(start, end))
            }
            (None, Some(start), Some(end)) => Ok(TextRange::new(start, end)),
            _ => bail!("Select a range to rewrite with --lines or --start/--end."),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stderr belongs to notices and stdout to --dry-run.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.eca/logs/eca-rewrite.log
    if let Some(home) = eca_home() {
        candidates.push(home.join("logs").join("eca-rewrite.log"));
    }

    // Fallback: ./.eca/logs/eca-rewrite.log
    candidates.push(PathBuf::from(".eca").join("logs").join("eca-rewrite.log"));

    candidates
}

fn resolve_prompt(explicit: Option<String>) -> Result<String> {
    let prompt = explicit
        .or_else(load_last_prompt)
        .map(|prompt| prompt.trim().to_string())
        .filter(|prompt| !prompt.is_empty())
        .context("No prompt given and no previous prompt to reuse; pass --prompt")?;

    if let Err(e) = persist_last_prompt(&prompt) {
        tracing::warn!("Failed to remember prompt: {e}");
    }
    Ok(prompt)
}

fn settings_from(config: &EcaConfig) -> RewriteSettings {
    RewriteSettings {
        prompt_prefix: config.rewrite.prompt_prefix.clone(),
        flush_delay: config.rewrite.flush_delay(),
        reject_overlapping: config.rewrite.reject_overlapping,
    }
}

fn print_notice(notice: &Notice) {
    let level = match notice.level {
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    eprintln!("{level}: {}", notice.message);
}

/// How the session ended, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accepted,
    Rejected,
    /// Ended before finishing: failure, interference, or interruption.
    Abandoned,
}

/// Plays the user: waits for the rewrite to finish, then accepts or rejects.
async fn host_loop(
    id: RewriteId,
    reject: bool,
    inputs: mpsc::Sender<RewriteInput>,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
) -> Outcome {
    let mut decided = None;
    let mut interrupted = false;

    let outcome = loop {
        let event = tokio::select! {
            event = events.recv() => event,
            result = signal::ctrl_c(), if !interrupted => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                }
                interrupted = true;
                eprintln!("Interrupted; restoring the original text.");
                let _ = inputs.send(RewriteInput::Reject(id)).await;
                continue;
            }
        };

        match event {
            None => break Outcome::Abandoned,
            Some(HostEvent::Notice(notice)) => print_notice(&notice),
            Some(HostEvent::Session(SessionUpdate { id: updated, lifecycle })) => {
                if updated != id {
                    continue;
                }
                match lifecycle {
                    Lifecycle::Requesting => eprintln!("Requesting LLM..."),
                    Lifecycle::Streaming => eprintln!("Rewriting..."),
                    Lifecycle::Finished => {
                        let (input, outcome) = if reject {
                            (RewriteInput::Reject(id), Outcome::Rejected)
                        } else {
                            (RewriteInput::Accept(id), Outcome::Accepted)
                        };
                        decided = Some(outcome);
                        let _ = inputs.send(input).await;
                    }
                    Lifecycle::Terminated => {
                        break match decided {
                            Some(outcome) if !interrupted => outcome,
                            _ => Outcome::Abandoned,
                        };
                    }
                }
            }
        }
    };

    let _ = inputs.send(RewriteInput::Shutdown).await;
    outcome
}

fn save(path: &Path, text: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        return Ok(());
    }
    atomic_write(
        path,
        text.as_bytes(),
        AtomicWriteOptions {
            sync: true,
            mode: PersistMode::PreserveExisting,
        },
    )
    .with_context(|| format!("writing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match EcaConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("warning: ignoring config at {}: {e}", e.path().display());
            EcaConfig::default()
        }
    };

    let path = fs::canonicalize(&cli.file)
        .with_context(|| format!("resolving {}", cli.file.display()))?;
    let text =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let uri = DocumentUri::new(path_to_file_uri(&path)?.to_string());
    let root = path.parent().unwrap_or(&path).to_path_buf();

    let (mut workspace, mut changes) = MemoryWorkspace::new();
    let selection = cli.selection(workspace.open(uri.clone(), text))?;
    let prompt = resolve_prompt(cli.prompt.clone())?;

    let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let server = EcaServer::<RewriteInput>::start(&config.server, &root, input_tx.clone())
        .await
        .context("starting the ECA server")?;

    let forward_tx = input_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            if forward_tx
                .send(RewriteInput::DocumentChanged(change))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut manager = RewriteManager::new(workspace, server, settings_from(&config));
    let started = manager
        .create(RewriteTrigger {
            uri: uri.clone(),
            path: path.display().to_string(),
            selection,
            prompt,
        })
        .await;
    let id = match started {
        Ok(id) => id,
        Err(e) => {
            for notice in manager.drain_notices() {
                print_notice(&notice);
            }
            forwarder.abort();
            let (_, server) = manager.into_parts();
            server.shutdown().await;
            return Err(e.into());
        }
    };

    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let driver = RewriteDriver::new(manager, input_rx).with_host(host_tx);
    let (manager, outcome) = tokio::join!(
        driver.run(),
        host_loop(id, cli.reject, input_tx, host_rx)
    );
    forwarder.abort();

    let (workspace, server) = manager.into_parts();
    server.shutdown().await;

    tracing::info!(rewrite_id = %id, ?outcome, "Rewrite done");
    match outcome {
        Outcome::Accepted => {
            let doc = workspace
                .document(&uri)
                .context("document closed during the rewrite")?;
            save(&path, doc.text(), cli.dry_run)?;
            if !cli.dry_run {
                eprintln!("Rewrote {}", path.display());
            }
            Ok(())
        }
        Outcome::Rejected => {
            eprintln!("Rejected; {} left unchanged.", path.display());
            Ok(())
        }
        Outcome::Abandoned => bail!("Rewrite did not finish; {} left unchanged.", path.display()),
    }
}
