use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ICON: &str = "⭐";

pub const ICON_CHOICES: &[&str] = &[
    "💪", "🏋️", "🥗", "💧", "📖", "📸", "🏃", "🧘", "😴", "🎯", "🔥", "⭐", "✨", "🎵", "📝", "💼",
    "🎨", "🧠",
];

/// A daily task definition in the registry.
///
/// Ids are stable for the lifetime of the task; they key the per-day
/// snapshots, so renaming a task never touches history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

impl Task {
    pub fn new(name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: generate_task_id(),
            name: name.into(),
            icon: icon.into(),
        }
    }

    fn fixed(id: &str, name: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
        }
    }
}

pub fn generate_task_id() -> String {
    format!("task_{}", Uuid::new_v4().simple())
}

/// The classic challenge checklist used by `init`.
pub fn starter_tasks() -> Vec<Task> {
    vec![
        Task::fixed("workout1", "45min Workout #1", "💪"),
        Task::fixed("workout2", "45min Workout #2", "🏋️"),
        Task::fixed("diet", "Follow Diet (No Cheat)", "🥗"),
        Task::fixed("water", "1 Gallon Water", "💧"),
        Task::fixed("reading", "10 Pages Reading", "📖"),
        Task::fixed("progress_pic", "Progress Picture", "📸"),
    ]
}

/// Trims a user-supplied name; `None` when nothing is left.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_icon(icon: Option<&str>) -> String {
    icon.map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ICON)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = generate_task_id();
        let b = generate_task_id();
        assert_ne!(a, b);
        assert!(a.starts_with("task_"));
    }

    #[test]
    fn missing_icon_defaults_on_decode() {
        let task: Task =
            serde_json::from_str(r#"{"id":"water","name":"1 Gallon Water"}"#).expect("decode");
        assert_eq!(task.icon, DEFAULT_ICON);
    }

    #[test]
    fn blank_names_normalize_to_none() {
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_name("  Meditate "), Some("Meditate".to_string()));
        assert_eq!(normalize_icon(Some(" ")), DEFAULT_ICON);
        assert_eq!(normalize_icon(Some("🧘")), "🧘");
    }

    #[test]
    fn starter_tasks_have_distinct_ids() {
        let tasks = starter_tasks();
        let mut ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }
}
