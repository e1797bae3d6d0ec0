use std::collections::{BTreeSet, HashSet};

use anyhow::anyhow;
use tracing::{debug, instrument, warn};

use crate::day::{COMPLETED_KEY, DayHistory, DaySnapshot, evaluate_completion};
use crate::documents::Documents;
use crate::task::{Task, normalize_icon, normalize_name};

pub const TOTAL_DAYS: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    pub total_days: u32,
    /// Remove a deleted task's key from every stored day, not only the active one.
    pub prune_history_on_delete: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            total_days: TOTAL_DAYS,
            prune_history_on_delete: false,
        }
    }
}

/// In-process owner of the task registry, the day cursor, the per-day
/// history and the completed-days projection.
///
/// Every mutating operation re-runs the completion rule for the active day
/// before returning, so `completed_days` never lags the active snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    options: TrackerOptions,
    tasks: Vec<Task>,
    current_day: u32,
    active: DaySnapshot,
    history: DayHistory,
    completed_days: BTreeSet<u32>,
}

impl Tracker {
    pub fn new(options: TrackerOptions) -> Self {
        Self::with_tasks(options, vec![])
    }

    pub fn with_tasks(options: TrackerOptions, tasks: Vec<Task>) -> Self {
        let options = sanitize_options(options);
        let active = DaySnapshot::zeroed(&tasks);
        Self {
            options,
            tasks,
            current_day: 1,
            active,
            history: DayHistory::new(),
            completed_days: BTreeSet::new(),
        }
    }

    /// Rebuilds state from loaded documents. Out-of-range values are
    /// clamped or dropped, then the active day is evaluated.
    #[instrument(skip(options, docs))]
    pub fn from_documents(options: TrackerOptions, docs: Documents) -> Self {
        let options = sanitize_options(options);
        let total = options.total_days;

        let mut seen = HashSet::new();
        let tasks: Vec<Task> = docs
            .tasks
            .into_iter()
            .filter(|task| {
                if task.id == COMPLETED_KEY || !seen.insert(task.id.clone()) {
                    warn!(id = %task.id, "dropping task with reserved or duplicate id");
                    return false;
                }
                true
            })
            .collect();

        let current_day = docs.current_day.clamp(1, total);
        if current_day != docs.current_day {
            warn!(
                stored = docs.current_day,
                clamped = current_day,
                "stored current day out of range"
            );
        }

        let mut history = docs.day_history;
        history.retain_days(|day| (1..=total).contains(&day));

        let completed_days: BTreeSet<u32> = docs
            .completed_days
            .into_iter()
            .filter(|day| (1..=total).contains(day))
            .collect();

        let active = history
            .get(current_day)
            .cloned()
            .unwrap_or_else(|| DaySnapshot::zeroed(&tasks));

        let mut tracker = Self {
            options,
            tasks,
            current_day,
            active,
            history,
            completed_days,
        };
        tracker.evaluate();
        debug!(
            tasks = tracker.tasks.len(),
            day = tracker.current_day,
            history = tracker.history.len(),
            completed = tracker.completed_days.len(),
            "tracker restored"
        );
        tracker
    }

    /// Full-state snapshot for persistence. The active day is merged into
    /// the history so edits made since the last navigation are kept.
    pub fn documents(&self) -> Documents {
        let mut day_history = self.history.clone();
        day_history.insert(self.current_day, self.active.clone());
        Documents {
            tasks: self.tasks.clone(),
            current_day: self.current_day,
            day_history,
            completed_days: self.completed_days.clone(),
        }
    }

    pub fn total_days(&self) -> u32 {
        self.options.total_days
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn current_day(&self) -> u32 {
        self.current_day
    }

    pub fn active(&self) -> &DaySnapshot {
        &self.active
    }

    pub fn history(&self) -> &DayHistory {
        &self.history
    }

    pub fn completed_days(&self) -> &BTreeSet<u32> {
        &self.completed_days
    }

    pub fn is_day_completed(&self, day: u32) -> bool {
        self.completed_days.contains(&day)
    }

    pub fn is_valid_day(&self, day: u32) -> bool {
        (1..=self.options.total_days).contains(&day)
    }

    pub fn clamp_day(&self, day: u32) -> u32 {
        day.clamp(1, self.options.total_days)
    }

    /// Finds a task by id, 1-based registry position, or case-insensitive name.
    pub fn resolve_task(&self, selector: &str) -> Option<&Task> {
        let selector = selector.trim();
        if let Some(task) = self.task(selector) {
            return Some(task);
        }
        if let Ok(pos) = selector.parse::<usize>()
            && pos >= 1
            && let Some(task) = self.tasks.get(pos - 1)
        {
            return Some(task);
        }
        self.tasks
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(selector))
    }

    /// Stores the outgoing day, moves the cursor, and loads the incoming
    /// day (or a zeroed one). Targets outside the challenge are clamped;
    /// navigating to the active day changes nothing. Returns the day landed on.
    #[instrument(skip(self), fields(from = self.current_day))]
    pub fn go_to_day(&mut self, target: u32) -> u32 {
        let target = self.clamp_day(target);
        if target == self.current_day {
            return target;
        }

        self.history.insert(self.current_day, self.active.clone());
        self.current_day = target;
        self.active = self
            .history
            .get(target)
            .cloned()
            .unwrap_or_else(|| DaySnapshot::zeroed(&self.tasks));
        self.evaluate();

        debug!(day = target, "navigated");
        target
    }

    pub fn next_day(&mut self) -> u32 {
        self.go_to_day(self.current_day.saturating_add(1))
    }

    pub fn prev_day(&mut self) -> u32 {
        self.go_to_day(self.current_day.saturating_sub(1))
    }

    /// Flips a registered task's mark on the active day. Returns the new mark.
    #[instrument(skip(self))]
    pub fn toggle_task(&mut self, task_id: &str) -> anyhow::Result<bool> {
        self.require_task(task_id)?;
        let done = self.active.toggle(task_id);
        self.evaluate();
        Ok(done)
    }

    /// Sets a registered task's mark. Returns whether anything changed.
    #[instrument(skip(self))]
    pub fn set_task(&mut self, task_id: &str, done: bool) -> anyhow::Result<bool> {
        self.require_task(task_id)?;
        if self.active.contains(task_id) && self.active.is_done(task_id) == done {
            return Ok(false);
        }
        self.active.set(task_id, done);
        self.evaluate();
        Ok(true)
    }

    /// Appends a task and marks it not done on the active day. Blank names
    /// are ignored. Returns the new id.
    #[instrument(skip(self))]
    pub fn add_task(&mut self, name: &str, icon: Option<&str>) -> Option<String> {
        let name = normalize_name(name)?;
        let task = Task::new(name, normalize_icon(icon));
        let id = task.id.clone();
        self.active.set(&id, false);
        self.tasks.push(task);
        self.evaluate();
        debug!(id = %id, "task added");
        Some(id)
    }

    /// Appends fully formed tasks (used for seeding). Returns how many were added.
    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) -> usize {
        let mut added = 0;
        for task in tasks {
            if task.id == COMPLETED_KEY || self.task(&task.id).is_some() {
                continue;
            }
            self.active.set(&task.id, false);
            self.tasks.push(task);
            added += 1;
        }
        if added > 0 {
            self.evaluate();
        }
        added
    }

    /// Renames a task and optionally changes its icon. Unknown ids and blank
    /// names leave the registry untouched.
    #[instrument(skip(self))]
    pub fn edit_task(&mut self, task_id: &str, name: &str, icon: Option<&str>) -> bool {
        let Some(name) = normalize_name(name) else {
            return false;
        };
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return false;
        };
        task.name = name;
        if let Some(icon) = icon.map(str::trim).filter(|s| !s.is_empty()) {
            task.icon = icon.to_string();
        }
        true
    }

    /// Removes a task from the registry and the active day. Stored days keep
    /// the key unless history pruning is enabled.
    #[instrument(skip(self))]
    pub fn delete_task(&mut self, task_id: &str) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.id == task_id)?;
        let task = self.tasks.remove(pos);
        self.active.remove(task_id);
        if self.options.prune_history_on_delete {
            let touched = self.history.remove_task(task_id);
            debug!(id = %task_id, touched, "pruned task from history");
        }
        self.evaluate();
        Some(task)
    }

    fn require_task(&self, task_id: &str) -> anyhow::Result<()> {
        if self.task(task_id).is_none() {
            return Err(anyhow!("no task with id {task_id}"));
        }
        Ok(())
    }

    /// Re-derives membership of the active day only.
    fn evaluate(&mut self) {
        let day = self.current_day;
        if evaluate_completion(&self.tasks, &self.active) {
            self.completed_days.insert(day);
            self.active.completed = Some(true);
            self.history.insert(day, self.active.clone());
        } else {
            self.completed_days.remove(&day);
            self.active.completed = None;
            if let Some(stored) = self.history.get_mut(day) {
                stored.completed = None;
            }
        }
    }
}

fn sanitize_options(mut options: TrackerOptions) -> TrackerOptions {
    if options.total_days == 0 {
        warn!("challenge length of 0 days; using 1");
        options.total_days = 1;
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_uppercase(),
            icon: "⭐".to_string(),
        }
    }

    fn tracker_with(ids: &[&str]) -> Tracker {
        Tracker::with_tasks(
            TrackerOptions::default(),
            ids.iter().map(|id| task(id)).collect(),
        )
    }

    #[test]
    fn fresh_tracker_starts_on_day_one_with_zeroed_marks() {
        let tracker = tracker_with(&["a", "b"]);
        assert_eq!(tracker.current_day(), 1);
        assert_eq!(tracker.active().len(), 2);
        assert!(!tracker.active().is_done("a"));
        assert!(tracker.completed_days().is_empty());
    }

    #[test]
    fn completing_every_task_marks_the_day() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.toggle_task("a").expect("toggle a");
        assert!(!tracker.is_day_completed(1));
        tracker.toggle_task("b").expect("toggle b");
        assert!(tracker.is_day_completed(1));
        assert!(tracker.history().get(1).expect("sealed day").is_sealed());

        tracker.toggle_task("b").expect("untoggle b");
        assert!(!tracker.is_day_completed(1));
        assert!(!tracker.history().get(1).expect("stored day").is_sealed());
    }

    #[test]
    fn navigating_to_the_active_day_changes_nothing() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.toggle_task("a").expect("toggle");
        let before = tracker.clone();
        assert_eq!(tracker.go_to_day(1), 1);
        assert_eq!(tracker, before);

        tracker.toggle_task("b").expect("toggle");
        let sealed = tracker.clone();
        tracker.go_to_day(1);
        assert_eq!(tracker, sealed);
    }

    #[test]
    fn navigation_stores_and_restores_snapshots() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.toggle_task("a").expect("toggle");
        tracker.go_to_day(2);
        assert!(!tracker.active().is_done("a"));
        assert!(tracker.history().get(1).expect("day 1 stored").is_done("a"));

        tracker.go_to_day(1);
        assert!(tracker.active().is_done("a"));
    }

    #[test]
    fn toggling_later_day_leaves_stored_day_alone() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.go_to_day(4);
        tracker.toggle_task("a").expect("toggle day 4");
        tracker.go_to_day(5);
        let stored_day4 = tracker.history().get(4).cloned();

        tracker.toggle_task("a").expect("toggle day 5");
        tracker.toggle_task("b").expect("toggle day 5");
        assert_eq!(tracker.history().get(4).cloned(), stored_day4);
        assert!(!tracker.is_day_completed(4));
        assert!(tracker.is_day_completed(5));
    }

    #[test]
    fn out_of_range_targets_are_clamped() {
        let mut tracker = tracker_with(&["a"]);
        assert_eq!(tracker.go_to_day(0), 1);
        assert_eq!(tracker.go_to_day(500), TOTAL_DAYS);
        assert_eq!(tracker.next_day(), TOTAL_DAYS);
        assert_eq!(tracker.prev_day(), TOTAL_DAYS - 1);
    }

    #[test]
    fn evaluation_only_touches_the_active_day() {
        let mut tracker = tracker_with(&["a"]);
        tracker.toggle_task("a").expect("toggle day 1");
        tracker.go_to_day(2);
        tracker.toggle_task("a").expect("toggle day 2");
        tracker.toggle_task("a").expect("untoggle day 2");
        assert!(tracker.is_day_completed(1));
        assert!(!tracker.is_day_completed(2));
    }

    #[test]
    fn deleting_a_task_keeps_a_completed_day_completed() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.toggle_task("a").expect("toggle a");
        tracker.toggle_task("b").expect("toggle b");
        assert!(tracker.is_day_completed(1));

        let removed = tracker.delete_task("b").expect("delete b");
        assert_eq!(removed.id, "b");
        assert!(!tracker.active().contains("b"));
        assert!(tracker.is_day_completed(1));
    }

    #[test]
    fn adding_a_task_reopens_a_completed_day() {
        let mut tracker = tracker_with(&["a"]);
        tracker.toggle_task("a").expect("toggle a");
        assert!(tracker.is_day_completed(1));

        let id = tracker
            .add_task("Meditate", Some("🧘"))
            .expect("task added");
        assert!(!tracker.is_day_completed(1));
        assert!(!tracker.active().is_done(&id));

        tracker.toggle_task(&id).expect("toggle new task");
        assert!(tracker.is_day_completed(1));
    }

    #[test]
    fn blank_names_are_ignored() {
        let mut tracker = tracker_with(&["a"]);
        assert_eq!(tracker.add_task("   ", None), None);
        assert_eq!(tracker.tasks().len(), 1);
        assert!(!tracker.edit_task("a", "", None));
        assert!(!tracker.edit_task("missing", "Name", None));
        assert_eq!(tracker.task("a").expect("task a").name, "A");
    }

    #[test]
    fn edit_keeps_icon_when_not_given() {
        let mut tracker = tracker_with(&["a"]);
        assert!(tracker.edit_task("a", " Run ", None));
        assert!(tracker.edit_task("a", "Run", Some("🏃")));
        let task = tracker.task("a").expect("task a");
        assert_eq!(task.name, "Run");
        assert_eq!(task.icon, "🏃");
    }

    #[test]
    fn toggling_an_unknown_task_is_an_error() {
        let mut tracker = tracker_with(&["a"]);
        assert!(tracker.toggle_task("zzz").is_err());
        assert_eq!(tracker.active().len(), 1);
    }

    #[test]
    fn registered_task_missing_from_snapshot_toggles_on() {
        let mut tracker = tracker_with(&["a"]);
        tracker.go_to_day(3);
        tracker.go_to_day(1);
        let id = tracker.add_task("Read", None).expect("added");
        tracker.go_to_day(3);
        assert!(!tracker.active().contains(&id));
        assert!(tracker.toggle_task(&id).expect("toggle"));
    }

    #[test]
    fn set_task_is_idempotent() {
        let mut tracker = tracker_with(&["a"]);
        assert!(tracker.set_task("a", true).expect("set"));
        assert!(!tracker.set_task("a", true).expect("set again"));
        assert!(tracker.is_day_completed(1));
    }

    #[test]
    fn empty_registry_never_completes_a_day() {
        let mut tracker = Tracker::new(TrackerOptions::default());
        tracker.go_to_day(2);
        tracker.go_to_day(1);
        assert!(tracker.completed_days().is_empty());
    }

    #[test]
    fn deletion_leaves_history_keys_unless_pruning() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.toggle_task("b").expect("toggle");
        tracker.go_to_day(2);
        tracker.delete_task("b");
        assert!(tracker.history().get(1).expect("day 1").contains("b"));

        let mut pruning = Tracker::with_tasks(
            TrackerOptions {
                prune_history_on_delete: true,
                ..TrackerOptions::default()
            },
            vec![task("a"), task("b")],
        );
        pruning.toggle_task("b").expect("toggle");
        pruning.go_to_day(2);
        pruning.delete_task("b");
        assert!(!pruning.history().get(1).expect("day 1").contains("b"));
    }

    #[test]
    fn documents_include_the_active_day() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.go_to_day(7);
        tracker.toggle_task("a").expect("toggle");
        let docs = tracker.documents();
        assert_eq!(docs.current_day, 7);
        assert!(docs.day_history.get(7).expect("day 7").is_done("a"));
        assert!(tracker.history().get(7).is_none());
    }

    #[test]
    fn restoring_from_documents_reproduces_state() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.toggle_task("a").expect("toggle");
        tracker.toggle_task("b").expect("toggle");
        tracker.go_to_day(2);
        tracker.toggle_task("a").expect("toggle");

        let restored = Tracker::from_documents(TrackerOptions::default(), tracker.documents());
        assert_eq!(restored.documents(), tracker.documents());
        assert_eq!(restored.current_day(), 2);
        assert!(restored.active().is_done("a"));
        assert!(restored.is_day_completed(1));
    }

    #[test]
    fn restoring_sanitizes_out_of_range_values() {
        let mut docs = Documents {
            tasks: vec![task("a"), task("a"), task(COMPLETED_KEY)],
            current_day: 99,
            ..Documents::default()
        };
        docs.completed_days.extend([0, 3, 76]);
        docs.day_history
            .insert(80, DaySnapshot::from_marks([("a", true)]));

        let tracker = Tracker::from_documents(TrackerOptions::default(), docs);
        assert_eq!(tracker.tasks().len(), 1);
        assert_eq!(tracker.current_day(), TOTAL_DAYS);
        assert_eq!(tracker.completed_days().iter().copied().collect::<Vec<_>>(), vec![3]);
        assert!(tracker.history().get(80).is_none());
    }

    #[test]
    fn restoring_reevaluates_the_current_day() {
        let mut docs = Documents {
            tasks: vec![task("a"), task("b")],
            current_day: 4,
            ..Documents::default()
        };
        docs.day_history
            .insert(4, DaySnapshot::from_marks([("a", true)]));
        docs.completed_days.insert(4);

        let tracker = Tracker::from_documents(TrackerOptions::default(), docs);
        assert!(!tracker.is_day_completed(4));
    }

    #[test]
    fn resolve_task_by_id_position_or_name() {
        let tracker = tracker_with(&["a", "b"]);
        assert_eq!(tracker.resolve_task("b").map(|t| t.id.as_str()), Some("b"));
        assert_eq!(tracker.resolve_task("1").map(|t| t.id.as_str()), Some("a"));
        assert_eq!(tracker.resolve_task("B").map(|t| t.id.as_str()), Some("b"));
        assert!(tracker.resolve_task("0").is_none());
        assert!(tracker.resolve_task("nope").is_none());

        let mut numeric = Tracker::new(TrackerOptions::default());
        let walk = numeric.add_task("Walk", None).expect("add");
        let steps = numeric.add_task("10000", None).expect("add");
        assert_eq!(numeric.resolve_task("10000").map(|t| t.id.clone()), Some(steps));
        assert_eq!(numeric.resolve_task("1").map(|t| t.id.clone()), Some(walk));
        assert!(numeric.resolve_task("3").is_none());
    }
}
