//! Run lifecycle controller.
//!
//! Owns one analysis run, forwards stop commands to it and emits status
//! messages for presentation layers while a stop is waiting on an in-flight
//! engine call. The session is prepared before any command is read, so a
//! command sent early still applies to the run.

use crate::model::{AnalysisSession, EngineOptions, LogLevel, RunnerEvent};
use crate::runner::{EngineRunner, RunOutcome};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by UI layers to control the running analysis.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Pause before the next engine, keeping the session resumable.
    Stop,
}

/// What the controller should run.
#[derive(Debug, Clone)]
pub(crate) enum RunRequest {
    Start,
    Resume(AnalysisSession),
}

fn status(event_tx: &UnboundedSender<RunnerEvent>, message: &str) {
    let _ = event_tx.send(RunnerEvent::Log {
        message: message.to_string(),
        level: LogLevel::Warning,
        duration_ms: None,
    });
}

/// Drive one run to its outcome, applying UI commands as they arrive.
pub(crate) async fn run_controller(
    runner: Arc<EngineRunner>,
    request: RunRequest,
    options: EngineOptions,
    event_tx: UnboundedSender<RunnerEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<RunOutcome> {
    let prepared = match request {
        RunRequest::Start => runner.prepare_start(&event_tx)?,
        RunRequest::Resume(saved) => runner.prepare_resume(saved, &event_tx)?,
    };
    let mut task = {
        let runner = runner.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move { runner.run(prepared, &options, &event_tx).await })
    };

    let mut commands_open = true;
    // Stop watchdog: if the in-flight engine keeps the pause waiting, say so once.
    let mut stop_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(UiCommand::Stop) => {
                        runner.stop_analysis();
                        status(&event_tx, "Stopping after the current engine…");
                        stop_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                    }
                    // UI went away; let the run finish on its own.
                    None => commands_open = false,
                }
            }
            joined = &mut task => {
                return joined.map_err(|e| anyhow!("analysis task failed: {e}"));
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = stop_deadline {
                    if tokio::time::Instant::now() >= deadline {
                        status(&event_tx, "Still stopping… waiting for the current engine to finish");
                        stop_deadline = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_config;
    use crate::model::{SessionStatus, UploadState};
    use crate::runner::tests::FakeInvoker;
    use crate::session::tests::MemoryKv;
    use crate::session::SessionStore;
    use crate::summary::tests::ScriptedBackend;
    use crate::summary::SummaryGenerator;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::sync::Notify;

    fn setup(invoker: FakeInvoker) -> (Arc<SessionStore>, Arc<EngineRunner>) {
        let store = Arc::new(SessionStore::new(Box::new(MemoryKv::default())));
        store.set_upload(UploadState {
            filename: "sales.csv".into(),
            columns: vec!["revenue".into()],
            row_count: None,
        });
        let summaries = SummaryGenerator::new(
            Arc::new(ScriptedBackend::always(Ok("s"))),
            &test_config("http://unused"),
        );
        let runner = EngineRunner::new(
            store.clone(),
            Arc::new(invoker),
            Arc::new(summaries),
            Duration::ZERO,
        );
        (store, Arc::new(runner))
    }

    #[tokio::test]
    async fn stop_command_pauses_after_in_flight_engine() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (store, runner) = setup(FakeInvoker::gated(entered.clone(), release.clone()));
        let (evt_tx, mut evt_rx) = unbounded_channel();
        let (cmd_tx, cmd_rx) = unbounded_channel();

        let ctl = tokio::spawn(run_controller(
            runner,
            RunRequest::Start,
            EngineOptions::default(),
            evt_tx,
            cmd_rx,
        ));
        entered.notified().await;
        cmd_tx.send(UiCommand::Stop).unwrap();
        while !store.is_stopped() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        release.notify_one();

        let outcome = ctl.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Paused { index: 1 });
        assert_eq!(store.session().status, SessionStatus::Paused);

        let mut saw_stopping = false;
        while let Ok(ev) = evt_rx.try_recv() {
            if let RunnerEvent::Log { message, .. } = ev {
                saw_stopping |= message.starts_with("Stopping");
            }
        }
        assert!(saw_stopping);
    }

    #[tokio::test]
    async fn stop_sent_before_the_run_starts_is_honoured() {
        let (store, runner) = setup(FakeInvoker::default());
        let (evt_tx, _evt_rx) = unbounded_channel();
        let (cmd_tx, cmd_rx) = unbounded_channel();
        cmd_tx.send(UiCommand::Stop).unwrap();

        let outcome = run_controller(
            runner,
            RunRequest::Start,
            EngineOptions::default(),
            evt_tx,
            cmd_rx,
        )
        .await
        .unwrap();

        // The command is read once the select loop starts; at most the engine
        // already spawned by then finishes before the pause.
        let RunOutcome::Paused { index } = outcome else {
            panic!("expected pause, got {outcome:?}");
        };
        assert!(index <= 1);
        let saved = store.load_session_from_storage().unwrap();
        assert_eq!(saved.status, SessionStatus::Paused);
        assert_eq!(saved.current_engine_index, index);
    }

    #[tokio::test]
    async fn closed_command_channel_lets_run_finish() {
        let (_store, runner) = setup(FakeInvoker::default());
        let (evt_tx, _evt_rx) = unbounded_channel();
        let (cmd_tx, cmd_rx) = unbounded_channel::<UiCommand>();
        drop(cmd_tx);

        let outcome = run_controller(
            runner,
            RunRequest::Start,
            EngineOptions::default(),
            evt_tx,
            cmd_rx,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(s) if s.success == 22));
    }

    #[tokio::test]
    async fn resume_of_foreign_session_surfaces_error() {
        let (_store, runner) = setup(FakeInvoker::default());
        let (evt_tx, _evt_rx) = unbounded_channel();
        let (_cmd_tx, cmd_rx) = unbounded_channel::<UiCommand>();
        let saved = AnalysisSession {
            filename: "other.csv".into(),
            status: SessionStatus::Paused,
            ..Default::default()
        };

        let err = run_controller(
            runner,
            RunRequest::Resume(saved),
            EngineOptions::default(),
            evt_tx,
            cmd_rx,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("cannot be resumed"));
    }
}
