use std::time::Duration;

use tracing::{debug, instrument};

use crate::autosave::Autosave;
use crate::datastore::{DataStore, Loaded, SaveOutcome};
use crate::task::Task;
use crate::tracker::{Tracker, TrackerOptions};

/// A live tracker wired to the debounced writer.
///
/// Each state-changing call hands a full snapshot to the writer; calls that
/// change nothing (blank names, unknown ids, navigating in place) do not.
#[derive(Debug)]
pub struct Session {
    tracker: Tracker,
    autosave: Autosave,
    loaded: Loaded,
}

impl Session {
    /// Loads the store, restores the tracker, and starts the writer.
    #[instrument(skip(store, options))]
    pub fn open(store: DataStore, options: TrackerOptions, delay: Duration) -> anyhow::Result<Self> {
        let loaded = store.load();
        let tracker = Tracker::from_documents(options, loaded.documents.clone());
        let autosave = Autosave::spawn(store, delay)?;
        Ok(Self {
            tracker,
            autosave,
            loaded,
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// What the initial load found.
    pub fn loaded(&self) -> &Loaded {
        &self.loaded
    }

    pub fn go_to_day(&mut self, day: u32) -> u32 {
        let before = self.tracker.current_day();
        let landed = self.tracker.go_to_day(day);
        if landed != before {
            self.touch();
        }
        landed
    }

    pub fn next_day(&mut self) -> u32 {
        self.go_to_day(self.tracker.current_day().saturating_add(1))
    }

    pub fn prev_day(&mut self) -> u32 {
        self.go_to_day(self.tracker.current_day().saturating_sub(1))
    }

    pub fn toggle_task(&mut self, task_id: &str) -> anyhow::Result<bool> {
        let done = self.tracker.toggle_task(task_id)?;
        self.touch();
        Ok(done)
    }

    pub fn set_task(&mut self, task_id: &str, done: bool) -> anyhow::Result<bool> {
        let changed = self.tracker.set_task(task_id, done)?;
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    pub fn add_task(&mut self, name: &str, icon: Option<&str>) -> Option<String> {
        let id = self.tracker.add_task(name, icon)?;
        self.touch();
        Some(id)
    }

    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) -> usize {
        let added = self.tracker.add_tasks(tasks);
        if added > 0 {
            self.touch();
        }
        added
    }

    pub fn edit_task(&mut self, task_id: &str, name: &str, icon: Option<&str>) -> bool {
        let edited = self.tracker.edit_task(task_id, name, icon);
        if edited {
            self.touch();
        }
        edited
    }

    pub fn delete_task(&mut self, task_id: &str) -> Option<Task> {
        let task = self.tracker.delete_task(task_id)?;
        self.touch();
        Some(task)
    }

    /// Writes any pending change now instead of waiting for the quiet period.
    pub fn flush_now(&self) -> anyhow::Result<Option<SaveOutcome>> {
        self.autosave.flush_now()
    }

    /// Flushes and stops the writer.
    pub fn close(self) -> anyhow::Result<()> {
        self.autosave.shutdown()
    }

    fn touch(&self) {
        debug!(day = self.tracker.current_day(), "scheduling autosave");
        self.autosave.schedule(self.tracker.documents());
    }
}
