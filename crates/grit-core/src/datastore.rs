use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::day::DayHistory;
use crate::documents::{
    COMPLETED_DAYS_DOC, CURRENT_DAY_DOC, CompletedDaysDocument, CurrentDayDocument,
    DAY_HISTORY_DOC, DOCUMENT_NAMES, Documents, TASKS_DOC, TasksDocument,
};

/// A namespace of named JSON documents.
///
/// `read` returns `Ok(None)` for a document that was never written.
pub trait DocumentStore: Send {
    fn read(&self, name: &str) -> anyhow::Result<Option<Value>>;
    fn write(&self, name: &str, doc: &Value) -> anyhow::Result<()>;
}

/// Documents stored as `<root>/<namespace>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    pub dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, namespace: &str) -> anyhow::Result<Self> {
        let dir = data_dir.join(namespace);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        info!(dir = %dir.display(), "opened document store");
        Ok(Self { dir })
    }

    pub fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl DocumentStore for FileStore {
    fn read(&self, name: &str) -> anyhow::Result<Option<Value>> {
        let path = self.document_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&text)
            .with_context(|| format!("failed parsing {}", path.display()))?;
        Ok(Some(value))
    }

    fn write(&self, name: &str, doc: &Value) -> anyhow::Result<()> {
        let path = self.document_path(name);
        debug!(file = %path.display(), "writing document atomically");

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut temp, doc)?;
        writeln!(temp)?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-memory namespace. Clones share the same documents, so a test can keep
/// a handle while a session owns another. Reads and writes can be made to
/// fail on demand.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<BTreeMap<String, Value>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, doc: Value) {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), doc);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful document writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, name: &str) -> anyhow::Result<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store read of {name} refused"));
        }
        Ok(self.get(name))
    }

    fn write(&self, name: &str, doc: &Value) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store write of {name} refused"));
        }
        self.insert(name, doc.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Result of a best-effort load.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub documents: Documents,
    /// Documents that did not exist yet.
    pub missing: Vec<&'static str>,
    /// Documents that could not be read or decoded; defaults were used.
    pub failed: Vec<&'static str>,
}

impl Loaded {
    pub fn is_fresh(&self) -> bool {
        self.missing.len() == DOCUMENT_NAMES.len()
    }
}

/// Result of a full save. Each document is written independently.
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    pub written: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl SaveOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load/save boundary between the tracker and a document store.
///
/// Failures never propagate: a document that cannot be loaded falls back
/// to its default, and a document that cannot be saved is logged while the
/// remaining documents are still written.
pub struct DataStore {
    store: Box<dyn DocumentStore>,
}

impl DataStore {
    pub fn new(store: impl DocumentStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Loaded {
        let mut loaded = Loaded::default();

        if let Some(doc) = self.load_document::<TasksDocument>(TASKS_DOC, &mut loaded) {
            loaded.documents.tasks = doc.tasks;
        }
        if let Some(doc) = self.load_document::<CurrentDayDocument>(CURRENT_DAY_DOC, &mut loaded) {
            loaded.documents.current_day = doc.day;
        }
        if let Some(history) = self.load_document::<DayHistory>(DAY_HISTORY_DOC, &mut loaded) {
            loaded.documents.day_history = history;
        }
        if let Some(doc) =
            self.load_document::<CompletedDaysDocument>(COMPLETED_DAYS_DOC, &mut loaded)
        {
            loaded.documents.completed_days = doc.days.into_iter().collect();
        }

        debug!(
            tasks = loaded.documents.tasks.len(),
            day = loaded.documents.current_day,
            missing = ?loaded.missing,
            failed = ?loaded.failed,
            "loaded documents"
        );
        loaded
    }

    fn load_document<T: DeserializeOwned>(
        &self,
        name: &'static str,
        loaded: &mut Loaded,
    ) -> Option<T> {
        let value = match self.store.read(name) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(document = name, "document missing; using default");
                loaded.missing.push(name);
                return None;
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(document = name, error = %error, "failed to load document; using default");
                loaded.failed.push(name);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(document = name, error = %err, "malformed document; using default");
                loaded.failed.push(name);
                None
            }
        }
    }

    /// Overwrites all four documents with `docs`.
    #[tracing::instrument(skip(self, docs), fields(day = docs.current_day))]
    pub fn save(&self, docs: &Documents) -> SaveOutcome {
        let mut outcome = SaveOutcome::default();
        for name in DOCUMENT_NAMES {
            let result = docs
                .encode(name)
                .and_then(|value| self.store.write(name, &value));
            match result {
                Ok(()) => outcome.written.push(name),
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(document = name, error = %error, "failed to save document");
                    outcome.failed.push((name, error));
                }
            }
        }
        debug!(
            written = outcome.written.len(),
            failed = outcome.failed.len(),
            "saved documents"
        );
        outcome
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore").finish_non_exhaustive()
    }
}
