//! Wire shapes of the four documents kept in the store namespace.
//!
//! ```text
//! tasks          { "tasks": [{ "id", "name", "icon" }, ...] }
//! currentDay     { "day": N }
//! dayHistory     { "day_N": { "<taskId>": bool, ..., "completed"?: bool }, ... }
//! completedDays  { "days": [N, ...] }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::day::DayHistory;
use crate::task::Task;

pub const TASKS_DOC: &str = "tasks";
pub const CURRENT_DAY_DOC: &str = "currentDay";
pub const DAY_HISTORY_DOC: &str = "dayHistory";
pub const COMPLETED_DAYS_DOC: &str = "completedDays";

pub const DOCUMENT_NAMES: [&str; 4] = [
    TASKS_DOC,
    CURRENT_DAY_DOC,
    DAY_HISTORY_DOC,
    COMPLETED_DAYS_DOC,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksDocument {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentDayDocument {
    pub day: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDaysDocument {
    #[serde(default)]
    pub days: Vec<u32>,
}

/// Full persisted state: one value per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Documents {
    pub tasks: Vec<Task>,
    pub current_day: u32,
    pub day_history: DayHistory,
    pub completed_days: BTreeSet<u32>,
}

impl Default for Documents {
    fn default() -> Self {
        Self {
            tasks: vec![],
            current_day: 1,
            day_history: DayHistory::new(),
            completed_days: BTreeSet::new(),
        }
    }
}

impl Documents {
    pub fn tasks_document(&self) -> TasksDocument {
        TasksDocument {
            tasks: self.tasks.clone(),
        }
    }

    pub fn current_day_document(&self) -> CurrentDayDocument {
        CurrentDayDocument {
            day: self.current_day,
        }
    }

    pub fn completed_days_document(&self) -> CompletedDaysDocument {
        CompletedDaysDocument {
            days: self.completed_days.iter().copied().collect(),
        }
    }

    /// Encodes one document by name.
    pub fn encode(&self, name: &str) -> anyhow::Result<serde_json::Value> {
        let value = match name {
            TASKS_DOC => serde_json::to_value(self.tasks_document())?,
            CURRENT_DAY_DOC => serde_json::to_value(self.current_day_document())?,
            DAY_HISTORY_DOC => serde_json::to_value(&self.day_history)?,
            COMPLETED_DAYS_DOC => serde_json::to_value(self.completed_days_document())?,
            other => anyhow::bail!("unknown document: {other}"),
        };
        Ok(value)
    }

    /// All four documents as one object keyed by document name.
    pub fn to_bundle(&self) -> anyhow::Result<serde_json::Value> {
        let mut bundle = serde_json::Map::new();
        for name in DOCUMENT_NAMES {
            bundle.insert(name.to_string(), self.encode(name)?);
        }
        Ok(serde_json::Value::Object(bundle))
    }
}
