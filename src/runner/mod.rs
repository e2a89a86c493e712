//! Engine runner: drives the registry one engine at a time.
//!
//! A run starts at a registry index and walks forward. Between engines (and
//! only there) it checks the store's stop flag; every finished engine, success
//! or error, is recorded and checkpointed before the next one starts, so a
//! persisted session always describes a prefix of the work and no engine runs
//! twice for one session.

use crate::api::EngineInvoker;
use crate::error::RunnerError;
use crate::metrics;
use crate::model::{
    AnalysisSession, EngineDefinition, EngineOptions, EngineResult, LogLevel, RunStats,
    RunnerEvent, SessionStatus,
};
use crate::registry::{self, ENGINES};
use crate::session::{gen_id, is_resumable, SessionStore};
use crate::summary::SummaryGenerator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;


/// How a call to [`EngineRunner::start_analysis`] or
/// [`EngineRunner::resume_analysis`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunStats),
    /// Stopped before the engine at `index`; resumable from there.
    Paused { index: usize },
    Cancelled,
}

/// Stop/cancel control for a run, usable while the runner itself is busy.
#[derive(Clone)]
pub struct RunnerHandle {
    store: Arc<SessionStore>,
}

impl RunnerHandle {
    /// Pause before the next engine and checkpoint right away. An engine call
    /// already in flight is allowed to finish and is still recorded.
    pub fn stop(&self) {
        self.store.pause_session();
        if self.store.status() == SessionStatus::Paused {
            self.store.save_session_to_storage();
        }
    }

    /// Stop and discard the session, including its checkpoint.
    pub fn cancel(&self) {
        self.store.cancel_session();
    }
}

pub struct EngineRunner {
    store: Arc<SessionStore>,
    invoker: Arc<dyn EngineInvoker>,
    summaries: Arc<SummaryGenerator>,
    step_delay: Duration,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when a run returns, however it returns.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A run whose session is initialised and checkpointed but whose engines have
/// not started. Holding it keeps the runner busy.
pub struct PreparedRun {
    _guard: RunGuard,
    start: usize,
    filename: String,
}

impl EngineRunner {
    pub fn new(
        store: Arc<SessionStore>,
        invoker: Arc<dyn EngineInvoker>,
        summaries: Arc<SummaryGenerator>,
        step_delay: Duration,
    ) -> Self {
        Self {
            store,
            invoker,
            summaries,
            step_delay,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            store: self.store.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<RunGuard, RunnerError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RunnerError::AlreadyRunning)?;
        Ok(RunGuard(self.running.clone()))
    }

    /// Fresh run over the whole registry for the current upload.
    pub async fn start_analysis(
        &self,
        options: &EngineOptions,
        events: &UnboundedSender<RunnerEvent>,
    ) -> Result<RunOutcome, RunnerError> {
        let prepared = self.prepare_start(events)?;
        Ok(self.run(prepared, options, events).await)
    }

    /// Continue a paused session from its saved cursor.
    pub async fn resume_analysis(
        &self,
        saved: AnalysisSession,
        options: &EngineOptions,
        events: &UnboundedSender<RunnerEvent>,
    ) -> Result<RunOutcome, RunnerError> {
        let prepared = self.prepare_resume(saved, events)?;
        Ok(self.run(prepared, options, events).await)
    }

    /// Initialise and checkpoint a fresh session. Stop and cancel requests
    /// made after this returns apply to the run.
    pub fn prepare_start(&self, events: &UnboundedSender<RunnerEvent>) -> Result<PreparedRun, RunnerError> {
        let upload = self.store.upload().ok_or(RunnerError::NoUpload)?;
        let guard = self.begin()?;

        self.store
            .init_session(&upload.filename, &registry::engine_names());
        self.store.save_session_to_storage();
        log(
            events,
            format!(
                "Starting analysis of {} ({} engines)",
                upload.filename,
                ENGINES.len()
            ),
            LogLevel::Info,
            None,
        );
        Ok(PreparedRun {
            _guard: guard,
            start: 0,
            filename: upload.filename,
        })
    }

    /// Restore a paused session and mark it running.
    pub fn prepare_resume(
        &self,
        saved: AnalysisSession,
        events: &UnboundedSender<RunnerEvent>,
    ) -> Result<PreparedRun, RunnerError> {
        let upload = self.store.upload().ok_or(RunnerError::NoUpload)?;
        if !is_resumable(&saved, &upload.filename) {
            return Err(RunnerError::NotResumable {
                saved: saved.filename,
                current: upload.filename,
            });
        }
        let guard = self.begin()?;

        let start = resume_index(&saved);
        if start != saved.current_engine_index {
            tracing::warn!(
                cursor = saved.current_engine_index,
                start,
                "saved cursor is past an unfinished engine; resuming from the earlier index"
            );
        }
        log(
            events,
            format!(
                "Resuming analysis of {} at engine {}/{} ({} already done)",
                upload.filename,
                start + 1,
                ENGINES.len(),
                saved.completed_engines.len()
            ),
            LogLevel::Info,
            None,
        );
        self.store.restore_session(saved);
        self.store.mark_running();
        self.store.save_session_to_storage();
        Ok(PreparedRun {
            _guard: guard,
            start,
            filename: upload.filename,
        })
    }

    /// Drive a prepared run to its outcome.
    pub async fn run(
        &self,
        prepared: PreparedRun,
        options: &EngineOptions,
        events: &UnboundedSender<RunnerEvent>,
    ) -> RunOutcome {
        self.run_loop(prepared.start, &prepared.filename, options, events)
            .await
    }

    pub fn stop_analysis(&self) {
        self.handle().stop();
    }

    pub fn cancel_analysis(&self) {
        self.handle().cancel();
    }

    async fn run_loop(
        &self,
        start: usize,
        filename: &str,
        options: &EngineOptions,
        events: &UnboundedSender<RunnerEvent>,
    ) -> RunOutcome {
        // One token per run keeps the summarization model pinned across all engines.
        let gpu_session = gen_id("gpu");
        let run_start = Instant::now();
        let total = ENGINES.len();
        tracing::info!(filename, start, total, %gpu_session, "analysis run started");

        for (index, engine) in ENGINES.iter().enumerate().skip(start) {
            if self.store.is_stopped() {
                return self.suspend(index, events);
            }
            if self.store.is_engine_completed(engine.name) {
                tracing::debug!(engine = engine.name, index, "already completed; skipping");
                continue;
            }

            let _ = events.send(RunnerEvent::EngineStarted {
                engine: *engine,
                index,
            });
            let _ = events.send(RunnerEvent::Progress {
                completed: index,
                total,
                engine: engine.display_name,
            });

            let result = self
                .run_engine(engine, filename, options, &gpu_session)
                .await;

            if !self.store.record_engine_result(engine.name, result.clone()) {
                if self.store.status() == SessionStatus::Idle {
                    tracing::info!(engine = engine.name, "run cancelled during engine call");
                    return RunOutcome::Cancelled;
                }
                continue;
            }
            self.store.save_session_to_storage();
            notify_result(events, engine, result);

            if index + 1 < total && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
        }

        if self.store.status() == SessionStatus::Idle {
            return RunOutcome::Cancelled;
        }

        let pending = self.store.session().pending_engines;
        if !pending.is_empty() {
            tracing::warn!(?pending, "completing with engines that were never attempted");
        }
        self.store.complete_session();
        self.store.save_session_to_storage();
        let stats = metrics::run_stats(&self.store.session(), total, run_start.elapsed());
        tracing::info!(
            success = stats.success,
            error = stats.error,
            total_time_ms = stats.total_time_ms,
            "analysis run completed"
        );
        let _ = events.send(RunnerEvent::AllCompleted { stats });
        RunOutcome::Completed(stats)
    }

    /// One engine step: invoke, then summarize on success.
    async fn run_engine(
        &self,
        engine: &EngineDefinition,
        filename: &str,
        options: &EngineOptions,
        gpu_session: &str,
    ) -> EngineResult {
        tracing::info!(engine = engine.name, "engine started");
        let started = Instant::now();
        let outcome = self.invoker.invoke(engine, filename, options).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                let summary = self.summaries.summarize(engine, &data, gpu_session).await;
                EngineResult::success(data, summary, duration_ms)
            }
            Err(e) => {
                tracing::warn!(engine = engine.name, error = %e, duration_ms, "engine failed");
                EngineResult::failure(e.to_string(), duration_ms)
            }
        }
    }

    fn suspend(&self, index: usize, events: &UnboundedSender<RunnerEvent>) -> RunOutcome {
        if self.store.status() == SessionStatus::Idle {
            tracing::info!(index, "run cancelled");
            return RunOutcome::Cancelled;
        }
        self.store.set_cursor(index);
        self.store.pause_session();
        self.store.save_session_to_storage();
        tracing::info!(index, "run paused");
        log(
            events,
            format!("Analysis paused before engine {}/{}", index + 1, ENGINES.len()),
            LogLevel::Warning,
            None,
        );
        let _ = events.send(RunnerEvent::Paused { index });
        RunOutcome::Paused { index }
    }
}

/// Earliest registry index a resume must start from: the saved cursor, or the
/// first unfinished engine before it.
fn resume_index(saved: &AnalysisSession) -> usize {
    let first_unfinished = ENGINES
        .iter()
        .position(|e| !saved.is_completed(e.name))
        .unwrap_or(ENGINES.len());
    saved.current_engine_index.min(first_unfinished)
}

fn notify_result(
    events: &UnboundedSender<RunnerEvent>,
    engine: &EngineDefinition,
    result: EngineResult,
) {
    let duration_ms = result.duration_ms;
    if result.is_success() {
        log(
            events,
            format!("{} completed", engine.display_name),
            LogLevel::Success,
            Some(duration_ms),
        );
        let _ = events.send(RunnerEvent::EngineCompleted {
            engine: *engine,
            result: Box::new(result),
            duration_ms,
        });
    } else {
        let error = result.error.unwrap_or_default();
        log(
            events,
            format!("{} failed: {}", engine.display_name, error),
            LogLevel::Error,
            Some(duration_ms),
        );
        let _ = events.send(RunnerEvent::EngineFailed {
            engine: *engine,
            error,
            duration_ms,
        });
    }
}

fn log(
    events: &UnboundedSender<RunnerEvent>,
    message: String,
    level: LogLevel,
    duration_ms: Option<u64>,
) {
    let _ = events.send(RunnerEvent::Log {
        message,
        level,
        duration_ms,
    });
}
