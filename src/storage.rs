//! On-disk persistence: the checkpoint key-value store and result exports.

use crate::model::AnalysisSession;
use crate::registry;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Durable string key-value store backing session checkpoints.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a state directory.
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create state dir {}", self.dir.display()))?;
        let path = self.path_for(key);
        // Write then rename so a crash mid-write never leaves a truncated checkpoint.
        // Each write gets its own tmp file; concurrent writers race only on the rename.
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp, value).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("rename to {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

/// Default state directory: `<data_local_dir>/nexus-runner`.
pub fn default_state_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(base.join("nexus-runner"))
}

/// Export the full session as pretty JSON.
pub fn export_json(path: &Path, session: &AnalysisSession) -> Result<()> {
    let out = serde_json::to_string_pretty(session)?;
    std::fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Export one row per recorded engine, in registry order.
pub fn export_csv(path: &Path, session: &AnalysisSession) -> Result<()> {
    let mut out = String::from("engine,category,status,duration_ms,data_size,error\n");
    for engine in registry::ENGINES.iter() {
        let Some(r) = session.results.get(engine.name) else {
            continue;
        };
        let status = if r.is_success() { "success" } else { "error" };
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            engine.name,
            engine.category.as_str(),
            status,
            r.duration_ms,
            r.data_size.map(|n| n.to_string()).unwrap_or_default(),
            csv_field(r.error.as_deref().unwrap_or("")),
        ));
    }
    std::fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
