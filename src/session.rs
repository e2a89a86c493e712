//! Session state store.
//!
//! Holds the in-memory [`AnalysisSession`] and [`UploadState`] for one host
//! process and checkpoints them through a [`KvStore`]. Persistence is
//! best-effort: storage errors are logged and swallowed so a lost checkpoint
//! only costs resumability.

use crate::model::{
    timestamp_utc, AnalysisSession, ChatMessage, EngineResult, SessionStatus, UploadState,
};
use crate::storage::KvStore;
use rand::RngCore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

pub const SESSION_KEY: &str = "nexus_session";
pub const UPLOAD_KEY: &str = "nexus_upload";

pub struct SessionStore {
    kv: Box<dyn KvStore>,
    session: Mutex<AnalysisSession>,
    upload: Mutex<Option<UploadState>>,
    stopped: AtomicBool,
}

/// Generate a random hex identifier with the given prefix.
pub fn gen_id(prefix: &str) -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{prefix}_{:016x}", u64::from_le_bytes(b))
}

impl SessionStore {
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        Self {
            kv,
            session: Mutex::new(AnalysisSession::default()),
            upload: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    // Critical sections never span an await, so a poisoned lock only means a
    // panicking reader; the data is still consistent.
    fn lock(&self) -> MutexGuard<'_, AnalysisSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_upload(&self) -> MutexGuard<'_, Option<UploadState>> {
        self.upload.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the in-memory session.
    pub fn session(&self) -> AnalysisSession {
        self.lock().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn is_engine_completed(&self, engine: &str) -> bool {
        self.lock().is_completed(engine)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Reset the in-memory session for a fresh run over `engine_names`.
    ///
    /// Does not touch storage; the caller checkpoints.
    pub fn init_session(&self, filename: &str, engine_names: &[&str]) -> AnalysisSession {
        let mut s = self.lock();
        *s = AnalysisSession {
            id: gen_id("session"),
            filename: filename.to_string(),
            status: SessionStatus::Running,
            started_at: Some(timestamp_utc()),
            pending_engines: engine_names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        };
        self.stopped.store(false, Ordering::SeqCst);
        s.clone()
    }

    /// Move `engine` from pending to completed and store its result.
    ///
    /// Returns `false` without recording when the session was cancelled while
    /// the engine call was in flight, or when the engine is already completed.
    pub fn record_engine_result(&self, engine: &str, result: EngineResult) -> bool {
        let mut s = self.lock();
        if s.status == SessionStatus::Idle {
            tracing::debug!(engine, "session reset; dropping late engine result");
            return false;
        }
        if s.is_completed(engine) {
            tracing::warn!(engine, "engine already recorded; ignoring duplicate result");
            return false;
        }
        s.completed_engines.push(engine.to_string());
        s.pending_engines.retain(|e| e != engine);
        s.results.insert(engine.to_string(), result);
        s.current_engine_index += 1;
        true
    }

    /// Record the registry index the run will continue from.
    pub fn set_cursor(&self, index: usize) {
        self.lock().current_engine_index = index;
    }

    pub fn pause_session(&self) {
        let mut s = self.lock();
        if s.status == SessionStatus::Running {
            s.status = SessionStatus::Paused;
            s.stopped_at = Some(timestamp_utc());
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn complete_session(&self) {
        let mut s = self.lock();
        s.status = SessionStatus::Completed;
        s.completed_at = Some(timestamp_utc());
    }

    /// Replace the in-memory session with a saved one and clear the stop flag.
    pub fn restore_session(&self, saved: AnalysisSession) {
        *self.lock() = saved;
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Paused -> running, when a restored session is about to continue.
    pub fn mark_running(&self) {
        let mut s = self.lock();
        s.status = SessionStatus::Running;
        s.stopped_at = None;
    }

    /// Hard reset: memory back to defaults and the checkpoint removed.
    pub fn cancel_session(&self) {
        *self.lock() = AnalysisSession::default();
        self.stopped.store(true, Ordering::SeqCst);
        self.clear_session_storage();
    }

    pub fn add_chat_message(&self, engine: &str, message: ChatMessage) {
        self.lock()
            .chats
            .entry(engine.to_string())
            .or_default()
            .push(message);
    }

    pub fn save_session_to_storage(&self) {
        let snapshot = self.session();
        let res = serde_json::to_string(&snapshot)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.kv.set(SESSION_KEY, &json));
        match res {
            Ok(()) => tracing::debug!(
                index = snapshot.current_engine_index,
                status = ?snapshot.status,
                "session checkpoint saved"
            ),
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "failed to save session checkpoint"),
        }
    }

    pub fn load_session_from_storage(&self) -> Option<AnalysisSession> {
        let raw = match self.kv.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failed to read session checkpoint");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "corrupt session checkpoint ignored");
                None
            }
        }
    }

    pub fn clear_session_storage(&self) {
        if let Err(e) = self.kv.remove(SESSION_KEY) {
            tracing::warn!(error = %format!("{e:#}"), "failed to clear session checkpoint");
        }
    }

    /// Load the checkpoint and accept it only if it is a paused session over
    /// `filename`. Anything else is stale and gets discarded.
    pub fn resumable_session(&self, filename: &str) -> Option<AnalysisSession> {
        let saved = self.load_session_from_storage()?;
        if is_resumable(&saved, filename) {
            return Some(saved);
        }
        tracing::info!(
            saved = %saved.filename,
            current = filename,
            status = ?saved.status,
            "discarding stale session checkpoint"
        );
        self.clear_session_storage();
        None
    }

    pub fn set_upload(&self, upload: UploadState) {
        *self.lock_upload() = Some(upload);
    }

    pub fn upload(&self) -> Option<UploadState> {
        self.lock_upload().clone()
    }

    pub fn clear_upload(&self) {
        *self.lock_upload() = None;
        if let Err(e) = self.kv.remove(UPLOAD_KEY) {
            tracing::warn!(error = %format!("{e:#}"), "failed to clear upload state");
        }
    }

    pub fn save_upload_to_storage(&self) {
        let Some(upload) = self.upload() else {
            return;
        };
        let res = serde_json::to_string(&upload)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.kv.set(UPLOAD_KEY, &json));
        if let Err(e) = res {
            tracing::warn!(error = %format!("{e:#}"), "failed to save upload state");
        }
    }

    /// Load the persisted upload into memory, returning it.
    pub fn load_upload_from_storage(&self) -> Option<UploadState> {
        let raw = match self.kv.get(UPLOAD_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failed to read upload state");
                return None;
            }
        };
        match serde_json::from_str::<UploadState>(&raw) {
            Ok(u) => {
                self.set_upload(u.clone());
                Some(u)
            }
            Err(e) => {
                tracing::warn!(error = %e, "corrupt upload state ignored");
                None
            }
        }
    }
}

/// A saved session may only continue against the same dataset, and only if it
/// was paused rather than finished.
pub fn is_resumable(saved: &AnalysisSession, filename: &str) -> bool {
    saved.status == SessionStatus::Paused && saved.filename == filename
}
