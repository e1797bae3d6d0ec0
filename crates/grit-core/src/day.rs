use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::task::Task;

/// Key of the seal flag stored alongside the task marks.
pub const COMPLETED_KEY: &str = "completed";

const DAY_KEY_PREFIX: &str = "day_";

/// Per-task completion marks for one day of the challenge.
///
/// On the wire this is a single flat object: `{ "<taskId>": bool, ...,
/// "completed"?: bool }`. The seal flag lives in its own field so it never
/// counts as a task mark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(flatten)]
    marks: BTreeMap<String, bool>,
}

impl DaySnapshot {
    /// Every registered task marked false.
    pub fn zeroed(tasks: &[Task]) -> Self {
        Self {
            completed: None,
            marks: tasks.iter().map(|t| (t.id.clone(), false)).collect(),
        }
    }

    pub fn from_marks<I, K>(marks: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            completed: None,
            marks: marks.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Absent keys read as not done.
    pub fn is_done(&self, task_id: &str) -> bool {
        self.marks.get(task_id).copied().unwrap_or(false)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.marks.contains_key(task_id)
    }

    pub fn set(&mut self, task_id: &str, done: bool) {
        self.marks.insert(task_id.to_string(), done);
    }

    /// Flips the mark, inserting it as done when absent. Returns the new value.
    pub fn toggle(&mut self, task_id: &str) -> bool {
        let next = !self.is_done(task_id);
        self.set(task_id, next);
        next
    }

    pub fn remove(&mut self, task_id: &str) -> bool {
        self.marks.remove(task_id).is_some()
    }

    /// Number of task marks, the seal flag excluded.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.completed == Some(true)
    }

    /// Registry tasks marked done on this day.
    pub fn done_count(&self, tasks: &[Task]) -> usize {
        tasks.iter().filter(|t| self.is_done(&t.id)).count()
    }
}

/// Completion rule for a single day.
///
/// A day is complete when the registry is non-empty, every registered task
/// is marked true, and the snapshot carries exactly as many marks as the
/// registry has tasks. The count check rejects snapshots captured before a
/// task was added.
pub fn evaluate_completion(tasks: &[Task], snapshot: &DaySnapshot) -> bool {
    !tasks.is_empty()
        && tasks.iter().all(|t| snapshot.is_done(&t.id))
        && snapshot.len() == tasks.len()
}

pub fn day_key(day: u32) -> String {
    format!("{DAY_KEY_PREFIX}{day}")
}

/// Parses `day_N`, plus the bare `N` keys written by older builds.
/// The flag reports whether the key was in canonical form.
pub fn parse_day_key(key: &str) -> Option<(u32, bool)> {
    if let Some(rest) = key.strip_prefix(DAY_KEY_PREFIX) {
        return rest.parse::<u32>().ok().map(|day| (day, true));
    }
    key.parse::<u32>().ok().map(|day| (day, false))
}

/// Snapshots captured per day, keyed by day number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayHistory {
    days: BTreeMap<u32, DaySnapshot>,
}

impl DayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, day: u32) -> Option<&DaySnapshot> {
        self.days.get(&day)
    }

    pub fn get_mut(&mut self, day: u32) -> Option<&mut DaySnapshot> {
        self.days.get_mut(&day)
    }

    pub fn insert(&mut self, day: u32, snapshot: DaySnapshot) {
        self.days.insert(day, snapshot);
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Drops `task_id` from every stored day. Returns how many days changed.
    pub fn remove_task(&mut self, task_id: &str) -> usize {
        self.days
            .values_mut()
            .map(|snap| snap.remove(task_id))
            .filter(|removed| *removed)
            .count()
    }

    pub fn retain_days(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.days.retain(|day, _| keep(*day));
    }
}

impl Serialize for DayHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for (day, snapshot) in &self.days {
            map.serialize_entry(&day_key(*day), snapshot)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DayHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, DaySnapshot>::deserialize(deserializer)?;
        let mut days = BTreeMap::new();
        let mut canonical = std::collections::BTreeSet::new();

        for (key, snapshot) in raw {
            let Some((day, is_canonical)) = parse_day_key(&key) else {
                warn!(key = %key, "ignoring unrecognized day history key");
                continue;
            };
            if is_canonical {
                canonical.insert(day);
                days.insert(day, snapshot);
            } else if !canonical.contains(&day) {
                days.entry(day).or_insert(snapshot);
            }
        }

        Ok(Self { days })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ids: &[&str]) -> Vec<Task> {
        ids.iter()
            .map(|id| Task {
                id: id.to_string(),
                name: id.to_uppercase(),
                icon: "⭐".to_string(),
            })
            .collect()
    }

    #[test]
    fn complete_when_every_task_is_done() {
        let tasks = registry(&["a", "b"]);
        let snap = DaySnapshot::from_marks([("a", true), ("b", true)]);
        assert!(evaluate_completion(&tasks, &snap));

        let partial = DaySnapshot::from_marks([("a", true), ("b", false)]);
        assert!(!evaluate_completion(&tasks, &partial));
    }

    #[test]
    fn empty_registry_never_completes() {
        assert!(!evaluate_completion(&[], &DaySnapshot::default()));
        let stray = DaySnapshot::from_marks([("a", true)]);
        assert!(!evaluate_completion(&[], &stray));
    }

    #[test]
    fn key_count_must_match_registry() {
        let tasks = registry(&["a"]);
        let stale = DaySnapshot::from_marks([("a", true), ("gone", true)]);
        assert!(!evaluate_completion(&tasks, &stale));
    }

    #[test]
    fn seal_flag_is_not_a_mark() {
        let tasks = registry(&["a"]);
        let mut snap = DaySnapshot::from_marks([("a", true)]);
        snap.completed = Some(true);
        assert_eq!(snap.len(), 1);
        assert!(evaluate_completion(&tasks, &snap));
    }

    #[test]
    fn toggle_inserts_absent_mark_as_done() {
        let mut snap = DaySnapshot::default();
        assert!(snap.toggle("a"));
        assert!(!snap.toggle("a"));
        assert!(snap.contains("a"));
    }

    #[test]
    fn snapshot_wire_shape_is_flat() {
        let mut snap = DaySnapshot::from_marks([("a", true), ("b", false)]);
        snap.completed = Some(true);
        let value = serde_json::to_value(&snap).expect("encode");
        assert_eq!(
            value,
            serde_json::json!({ "a": true, "b": false, "completed": true })
        );

        let decoded: DaySnapshot = serde_json::from_value(value).expect("decode");
        assert_eq!(decoded.len(), 2);
        assert!(decoded.is_sealed());
    }

    #[test]
    fn day_keys() {
        assert_eq!(day_key(12), "day_12");
        assert_eq!(parse_day_key("day_12"), Some((12, true)));
        assert_eq!(parse_day_key("12"), Some((12, false)));
        assert_eq!(parse_day_key("day_x"), None);
        assert_eq!(parse_day_key("week_1"), None);
    }

    #[test]
    fn history_prefers_canonical_keys_over_legacy() {
        let value = serde_json::json!({
            "3": { "a": false },
            "day_3": { "a": true },
            "4": { "a": true },
            "notes": { "a": true },
        });
        let history: DayHistory = serde_json::from_value(value).expect("decode");
        assert_eq!(history.len(), 2);
        assert!(history.get(3).expect("day 3").is_done("a"));
        assert!(history.get(4).expect("day 4").is_done("a"));

        let encoded = serde_json::to_value(&history).expect("encode");
        assert!(encoded.get("day_4").is_some());
        assert!(encoded.get("4").is_none());
    }

    #[test]
    fn remove_task_counts_touched_days() {
        let mut history = DayHistory::new();
        history.insert(1, DaySnapshot::from_marks([("a", true), ("b", true)]));
        history.insert(2, DaySnapshot::from_marks([("a", false)]));
        assert_eq!(history.remove_task("b"), 1);
        assert!(!history.get(1).expect("day 1").contains("b"));
    }
}
