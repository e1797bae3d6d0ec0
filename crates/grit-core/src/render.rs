use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::report::Progress;
use crate::task::{ICON_CHOICES, Task};
use crate::tracker::Tracker;

const HEATMAP_COLUMNS: u32 = 15;
const BAR_WIDTH: usize = 20;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            color: cfg.color()?,
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// The active day: header, one row per task, then the progress panels.
    #[tracing::instrument(skip_all)]
    pub fn write_day<W: Write>(&self, mut out: W, tracker: &Tracker) -> anyhow::Result<()> {
        let day = tracker.current_day();
        let header = format!("Day {day}/{}", tracker.total_days());
        if tracker.is_day_completed(day) {
            writeln!(out, "{}  {}", self.paint(&header, "1"), self.paint("CRUSHED", "32"))?;
        } else {
            writeln!(out, "{}", self.paint(&header, "1"))?;
        }
        writeln!(out)?;

        if tracker.tasks().is_empty() {
            writeln!(out, "No tasks yet. Run `grit init` or `grit add <name>`.")?;
        } else {
            let active = tracker.active();
            let rows = tracker
                .tasks()
                .iter()
                .enumerate()
                .map(|(idx, task)| {
                    let done = if active.is_done(&task.id) {
                        self.paint("[x]", "32")
                    } else {
                        "[ ]".to_string()
                    };
                    vec![
                        self.paint(&(idx + 1).to_string(), "33"),
                        done,
                        task.icon.clone(),
                        task.name.clone(),
                        task.id.clone(),
                    ]
                })
                .collect();
            write_table(&mut out, headers(&["#", "Done", "", "Task", "ID"]), rows)?;
        }

        writeln!(out)?;
        self.write_progress(&mut out, &Progress::of(tracker))
    }

    pub fn write_progress<W: Write>(&self, mut out: W, progress: &Progress) -> anyhow::Result<()> {
        writeln!(
            out,
            "Today's Hustle  {} {:>5}  {}/{} tasks",
            self.bar(progress.today_percent),
            format!("{:.0}%", progress.today_percent),
            progress.tasks_done,
            progress.tasks_total
        )?;
        writeln!(
            out,
            "The Long Haul   {} {:>5}  {}/{} days",
            self.bar(progress.overall_percent),
            format!("{:.1}%", progress.overall_percent),
            progress.days_completed,
            progress.total_days
        )?;
        writeln!(out, "Streak          {} days", progress.streak)?;
        Ok(())
    }

    /// Grid of every challenge day, `HEATMAP_COLUMNS` per row.
    #[tracing::instrument(skip_all)]
    pub fn write_heatmap<W: Write>(&self, mut out: W, tracker: &Tracker) -> anyhow::Result<()> {
        let total = tracker.total_days();
        let current = tracker.current_day();
        let width = total.to_string().len();

        let mut row = Vec::with_capacity(HEATMAP_COLUMNS as usize);
        for day in 1..=total {
            let cell = if day == current {
                self.paint(&format!(">{day:>width$}"), "1;36")
            } else if tracker.is_day_completed(day) {
                self.paint(&format!("#{day:>width$}"), "32")
            } else {
                self.paint(&format!(".{day:>width$}"), "90")
            };
            row.push(cell);

            if day % HEATMAP_COLUMNS == 0 || day == total {
                writeln!(out, "{}", row.join(" "))?;
                row.clear();
            }
        }

        writeln!(out)?;
        writeln!(out, "# crushed   > current   . open")?;
        Ok(())
    }

    pub fn write_task_list<W: Write>(&self, mut out: W, tasks: &[Task]) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let rows = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| {
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    task.icon.clone(),
                    task.name.clone(),
                    task.id.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers(&["#", "", "Task", "ID"]), rows)
    }

    pub fn write_icons<W: Write>(&self, mut out: W) -> anyhow::Result<()> {
        for (idx, icon) in ICON_CHOICES.iter().enumerate() {
            writeln!(out, "{:>2}  {icon}", idx + 1)?;
        }
        Ok(())
    }

    fn bar(&self, percent: f64) -> String {
        let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
        let fill = self.paint(&"#".repeat(filled), "32");
        format!("[{fill}{}]", "-".repeat(BAR_WIDTH - filled))
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let line = |cells: &[String]| -> String {
        let mut line = String::new();
        for (idx, cell) in cells.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        line.trim_end().to_string()
    };

    writeln!(writer, "{}", line(&headers))?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(writer, "{}", line(&rule))?;

    for row in &rows {
        writeln!(writer, "{}", line(row))?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
