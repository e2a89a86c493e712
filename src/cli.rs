use crate::api::NexusClient;
use crate::model::{ChatMessage, ChatRole, EngineOptions, LogLevel, RunConfig, RunnerEvent};
use crate::orchestrator::{self, ExportTargets, RunRequest, UiCommand};
use crate::registry::{self, ENGINES};
use crate::runner::{EngineRunner, RunOutcome};
use crate::session::{gen_id, SessionStore};
use crate::storage::{self, FileKv};
use crate::summary::SummaryGenerator;
use crate::text_summary;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "nexus-runner",
    version,
    about = "Run the NexusAI analysis engines against a dataset, with pause and resume"
)]
pub struct Cli {
    /// Base URL of the NexusAI backend
    #[arg(long, env = "NEXUS_API_URL", default_value = "http://localhost:8000", global = true)]
    pub base_url: String,

    /// Directory holding the session checkpoint (defaults to the user data dir)
    #[arg(long, env = "NEXUS_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Timeout for a single engine call
    #[arg(long, default_value = "60s", global = true)]
    pub engine_timeout: humantime::Duration,

    /// Timeout for a single summary attempt
    #[arg(long, default_value = "90s", global = true)]
    pub summary_timeout: humantime::Duration,

    /// Summary retries after the first attempt
    #[arg(long, default_value_t = 2, global = true)]
    pub summary_retries: u32,

    /// Initial summary retry delay, doubled per retry
    #[arg(long, default_value = "1s", global = true)]
    pub summary_backoff: humantime::Duration,

    /// Token budget for generated summaries
    #[arg(long, default_value_t = 256, global = true)]
    pub summary_max_tokens: u32,

    /// Pause between engines
    #[arg(long, default_value = "300ms", global = true)]
    pub step_delay: humantime::Duration,

    /// Emit newline-delimited JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter when RUST_LOG is unset (e.g. info, debug)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Upload a dataset and analyze it, resuming a matching paused session
    Analyze(AnalyzeArgs),
    /// Resume the paused session for the last uploaded dataset
    Resume(RunArgs),
    /// Show the saved session
    Status,
    /// Discard the saved session
    Cancel {
        /// Also forget the last uploaded dataset
        #[arg(long)]
        all: bool,
    },
    /// Ask a follow-up question about one engine's result
    Ask {
        /// Engine name, see `engines`
        engine: String,
        question: String,
    },
    /// List the analysis engines in execution order
    Engines,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Dataset to upload (CSV, XLSX, …)
    pub file: PathBuf,

    /// Start over even if a paused session exists for this dataset
    #[arg(long)]
    pub fresh: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Target column for supervised engines
    #[arg(long)]
    pub target: Option<String>,

    /// Feature columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Ask engines to use the extra feature pass
    #[arg(long)]
    pub extra_feature: bool,

    /// Export the finished session as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export per-engine results as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,
}

impl RunArgs {
    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            target_column: self.target.clone(),
            features: self.features.clone(),
            use_extra_feature: self.extra_feature,
        }
    }

    fn export_targets(&self) -> ExportTargets {
        ExportTargets {
            json: self.export_json.clone(),
            csv: self.export_csv.clone(),
        }
    }
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        base_url: args.base_url.clone(),
        user_agent: format!("nexus-runner/{}", env!("CARGO_PKG_VERSION")),
        engine_timeout: Duration::from(args.engine_timeout),
        summary_timeout: Duration::from(args.summary_timeout),
        summary_retries: args.summary_retries,
        summary_backoff: Duration::from(args.summary_backoff),
        summary_max_tokens: args.summary_max_tokens,
        step_delay: Duration::from(args.step_delay),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    tracing::debug!(config = ?cfg, "resolved configuration");
    let state_dir = match args.state_dir.clone() {
        Some(dir) => dir,
        None => storage::default_state_dir()?,
    };
    let store = Arc::new(SessionStore::new(Box::new(FileKv::new(state_dir))));

    match &args.command {
        Command::Engines => {
            print_engines(args.json)?;
            Ok(())
        }
        Command::Status => print_status(&store, args.json),
        Command::Cancel { all } => {
            let client = Arc::new(NexusClient::new(&cfg)?);
            build_runner(&cfg, store.clone(), client).cancel_analysis();
            if *all {
                store.clear_upload();
            }
            eprintln!("Saved session discarded.");
            Ok(())
        }
        Command::Ask { engine, question } => ask(&cfg, &store, engine, question, args.json).await,
        Command::Analyze(a) => analyze(&args, &cfg, store, a).await,
        Command::Resume(r) => resume(&args, &cfg, store, r).await,
    }
}

async fn analyze(args: &Cli, cfg: &RunConfig, store: Arc<SessionStore>, a: &AnalyzeArgs) -> Result<()> {
    let client = Arc::new(NexusClient::new(cfg)?);
    let upload = client
        .upload_file(&a.file)
        .await
        .with_context(|| format!("upload {}", a.file.display()))?;
    eprintln!(
        "Uploaded {} ({} columns{})",
        upload.filename,
        upload.columns.len(),
        upload
            .row_count
            .map(|n| format!(", {n} rows"))
            .unwrap_or_default()
    );
    store.set_upload(upload.clone());
    store.save_upload_to_storage();

    let request = match store.resumable_session(&upload.filename) {
        Some(saved) if !a.fresh => RunRequest::Resume(saved),
        _ => RunRequest::Start,
    };
    execute(args, cfg, store, client, request, &a.run).await
}

async fn resume(args: &Cli, cfg: &RunConfig, store: Arc<SessionStore>, r: &RunArgs) -> Result<()> {
    let upload = store
        .load_upload_from_storage()
        .context("no uploaded dataset recorded; run `nexus-runner analyze <FILE>` first")?;
    let saved = store
        .resumable_session(&upload.filename)
        .with_context(|| format!("no paused session for {}", upload.filename))?;
    let client = Arc::new(NexusClient::new(cfg)?);
    execute(args, cfg, store, client, RunRequest::Resume(saved), r).await
}

/// What a Ctrl-C press does during a run. No press discards the checkpoint;
/// that is left to the `cancel` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Pause before the next engine and checkpoint.
    Stop,
    /// Leave now without waiting for the in-flight engine.
    Exit,
}

fn interrupt_for(press: u32) -> Interrupt {
    if press <= 1 {
        Interrupt::Stop
    } else {
        Interrupt::Exit
    }
}

fn build_runner(cfg: &RunConfig, store: Arc<SessionStore>, client: Arc<NexusClient>) -> Arc<EngineRunner> {
    let summaries = Arc::new(SummaryGenerator::new(client.clone(), cfg));
    Arc::new(EngineRunner::new(store, client, summaries, cfg.step_delay))
}

/// Run the controller with Ctrl-C wired to stop (first press) and exit
/// (second press).
async fn execute(
    args: &Cli,
    cfg: &RunConfig,
    store: Arc<SessionStore>,
    client: Arc<NexusClient>,
    request: RunRequest,
    run_args: &RunArgs,
) -> Result<()> {
    let runner = build_runner(cfg, store.clone(), client);
    let handle = runner.handle();

    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<RunnerEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (out_tx, out_handle) = spawn_output_writer();
    let exit_now = Arc::new(Notify::new());

    let signals = {
        let exit_now = exit_now.clone();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let mut presses = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                presses += 1;
                match interrupt_for(presses) {
                    Interrupt::Stop => {
                        let _ = out_tx.send(OutputLine::Stderr(
                            "Press Ctrl-C again to exit now; finished engines stay saved.".into(),
                        ));
                        if cmd_tx.send(UiCommand::Stop).is_err() {
                            break;
                        }
                    }
                    Interrupt::Exit => {
                        exit_now.notify_one();
                        break;
                    }
                }
            }
        })
    };
    let printer = tokio::spawn(print_events(evt_rx, out_tx.clone(), args.json));

    let controller = orchestrator::run_controller(
        runner,
        request,
        run_args.engine_options(),
        evt_tx,
        cmd_rx,
    );
    let outcome = tokio::select! {
        outcome = controller => Some(outcome),
        _ = exit_now.notified() => None,
    };
    signals.abort();

    let Some(outcome) = outcome else {
        // The run task still holds an event sender; stop printing instead of
        // waiting for it.
        printer.abort();
        handle.stop();
        let _ = out_tx.send(OutputLine::Stderr(
            "Exited before the current engine finished. Run `nexus-runner resume` to continue.".into(),
        ));
        drop(out_tx);
        let _ = out_handle.await;
        return Ok(());
    };
    let _ = printer.await;
    let outcome = outcome?;

    match outcome {
        RunOutcome::Completed(stats) => {
            let session = store.session();
            for msg in orchestrator::process_run_completion(&run_args.export_targets(), &session) {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
            if !args.json {
                let summary = text_summary::build_text_summary(&session, Some(&stats));
                let _ = out_tx.send(OutputLine::Stdout(String::new()));
                for line in summary.lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
        }
        RunOutcome::Paused { index } => {
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "Paused before engine {}/{}. Run `nexus-runner resume` to continue.",
                index + 1,
                ENGINES.len()
            )));
        }
        RunOutcome::Cancelled => {
            let _ = out_tx.send(OutputLine::Stderr("Analysis cancelled.".into()));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn print_events(
    mut evt_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    json: bool,
) {
    while let Some(ev) = evt_rx.recv().await {
        if json {
            if let Ok(line) = serde_json::to_string(&ev) {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
            continue;
        }
        let line = match ev {
            RunnerEvent::EngineStarted { engine, index } => format!(
                "[{:>2}/{}] {} {}…",
                index + 1,
                ENGINES.len(),
                engine.icon,
                engine.display_name
            ),
            RunnerEvent::EngineCompleted {
                result,
                duration_ms,
                ..
            } => format!(
                "        ✓ {:.1}s  {}",
                duration_ms as f64 / 1000.0,
                result.summary.as_deref().unwrap_or("")
            ),
            RunnerEvent::EngineFailed {
                error, duration_ms, ..
            } => format!("        ✗ {:.1}s  {}", duration_ms as f64 / 1000.0, error),
            RunnerEvent::Log {
                message,
                level: LogLevel::Info | LogLevel::Warning,
                ..
            } => message,
            // Progress, per-engine logs and the final stats are covered elsewhere.
            _ => continue,
        };
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
}

fn print_engines(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ENGINES)?);
        return Ok(());
    }
    for (i, e) in ENGINES.iter().enumerate() {
        println!(
            "{:>2}. {} {:<24} {:<22} {}",
            i + 1,
            e.icon,
            e.display_name,
            e.name,
            e.category.as_str()
        );
    }
    Ok(())
}

fn print_status(store: &SessionStore, json: bool) -> Result<()> {
    let Some(session) = store.load_session_from_storage() else {
        eprintln!("No saved session.");
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        for line in text_summary::build_text_summary(&session, None).lines {
            println!("{line}");
        }
    }
    Ok(())
}

async fn ask(
    cfg: &RunConfig,
    store: &SessionStore,
    engine: &str,
    question: &str,
    json: bool,
) -> Result<()> {
    let definition = registry::find(engine)
        .with_context(|| format!("unknown engine {engine:?}; see `nexus-runner engines`"))?;
    let saved = store
        .load_session_from_storage()
        .context("no saved session to ask about")?;
    let Some(result) = saved.results.get(engine).cloned() else {
        bail!("{engine} has no result in the saved session");
    };
    if !result.is_success() {
        bail!(
            "{engine} failed ({}); nothing to ask about",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    let history = saved.chats.get(engine).cloned().unwrap_or_default();

    let client = Arc::new(NexusClient::new(cfg)?);
    let generator = SummaryGenerator::new(client, cfg);
    let answer = generator
        .answer(definition, &result, &history, question, &gen_id("gpu"))
        .await
        .context("follow-up question failed")?;

    store.restore_session(saved);
    store.add_chat_message(engine, ChatMessage::new(ChatRole::User, question));
    store.add_chat_message(engine, ChatMessage::new(ChatRole::Assistant, answer.clone()));
    store.save_session_to_storage();

    if json {
        println!(
            "{}",
            serde_json::json!({"engine": engine, "question": question, "answer": answer})
        );
    } else {
        println!("{answer}");
    }
    Ok(())
}
