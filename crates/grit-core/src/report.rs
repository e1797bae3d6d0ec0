use std::collections::BTreeSet;

use crate::tracker::Tracker;

/// Numbers behind the progress panels and the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub day: u32,
    pub total_days: u32,
    pub tasks_done: usize,
    pub tasks_total: usize,
    pub today_percent: f64,
    pub days_completed: usize,
    pub overall_percent: f64,
    pub streak: u32,
}

impl Progress {
    pub fn of(tracker: &Tracker) -> Self {
        let tasks_total = tracker.tasks().len();
        let tasks_done = tracker.active().done_count(tracker.tasks());
        let today_percent = if tasks_total == 0 {
            0.0
        } else {
            tasks_done as f64 / tasks_total as f64 * 100.0
        };

        let total_days = tracker.total_days();
        let days_completed = tracker.completed_days().len();
        let overall_percent = days_completed as f64 / f64::from(total_days) * 100.0;

        Self {
            day: tracker.current_day(),
            total_days,
            tasks_done,
            tasks_total,
            today_percent,
            days_completed,
            overall_percent,
            streak: current_streak(tracker.completed_days(), tracker.current_day()),
        }
    }

    pub fn is_flawless(&self) -> bool {
        self.tasks_total > 0 && self.tasks_done == self.tasks_total
    }
}

/// Consecutive completed days ending at `day`, or at the day before when
/// `day` itself is still open.
pub fn current_streak(completed: &BTreeSet<u32>, day: u32) -> u32 {
    let mut cursor = if completed.contains(&day) {
        day
    } else {
        day.saturating_sub(1)
    };
    let mut streak = 0;
    while cursor > 0 && completed.contains(&cursor) {
        streak += 1;
        cursor -= 1;
    }
    streak
}

pub fn generate_report(tracker: &Tracker) -> String {
    let progress = Progress::of(tracker);
    let active = tracker.active();

    let done: Vec<&str> = tracker
        .tasks()
        .iter()
        .filter(|t| active.is_done(&t.id))
        .map(|t| t.name.as_str())
        .collect();
    let pending: Vec<&str> = tracker
        .tasks()
        .iter()
        .filter(|t| !active.is_done(&t.id))
        .map(|t| t.name.as_str())
        .collect();

    let done = if done.is_empty() {
        "None yet".to_string()
    } else {
        done.join(", ")
    };
    let pending = if pending.is_empty() {
        "All done!".to_string()
    } else {
        pending.join(", ")
    };
    let closing = if progress.is_flawless() {
        "💎 FLAWLESS EXECUTION. NO EXCUSES."
    } else {
        "⚡ Keep pushing. You got this."
    };

    let lines = [
        format!("🔥 {}-DAY HARD CHALLENGE REPORT 🔥", progress.total_days),
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_string(),
        format!(
            "Day {}/{} | Streak: {} days",
            progress.day, progress.total_days, progress.streak
        ),
        String::new(),
        format!("TODAY'S HUSTLE: {:.0}%", progress.today_percent),
        format!("✅ Completed: {done}"),
        format!("❌ Pending: {pending}"),
        String::new(),
        format!("THE LONG HAUL: {:.1}%", progress.overall_percent),
        format!(
            "📊 Days Crushed: {}/{}",
            progress.days_completed, progress.total_days
        ),
        String::new(),
        closing.to_string(),
    ];
    lines.join("\n")
}
