use std::io::{BufRead, Write};

use anyhow::{Context, anyhow, bail};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::render::Renderer;
use crate::report::generate_report;
use crate::session::Session;
use crate::task::{Task, starter_tasks};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "status",
        "toggle",
        "check",
        "uncheck",
        "day",
        "next",
        "prev",
        "today",
        "add",
        "edit",
        "delete",
        "tasks",
        "heatmap",
        "report",
        "export",
        "init",
        "icons",
        "shell",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(session, cfg, renderer, inv, out))]
pub fn dispatch<W: Write>(
    session: &mut Session,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
    out: &mut W,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = inv.args.as_slice();

    debug!(command, args = ?args, "dispatching command");

    match command {
        "status" => renderer.write_day(out, session.tracker()),
        "toggle" => cmd_toggle(session, args, out),
        "check" => cmd_mark(session, args, true, out),
        "uncheck" => cmd_mark(session, args, false, out),
        "day" => cmd_day(session, renderer, args, out),
        "next" => {
            session.next_day();
            renderer.write_day(out, session.tracker())
        }
        "prev" => {
            session.prev_day();
            renderer.write_day(out, session.tracker())
        }
        "today" => cmd_today(session, cfg, renderer, out),
        "add" => cmd_add(session, args, out),
        "edit" => cmd_edit(session, args, out),
        "delete" => cmd_delete(session, args, out),
        "tasks" => renderer.write_task_list(out, session.tracker().tasks()),
        "heatmap" => renderer.write_heatmap(out, session.tracker()),
        "report" => {
            writeln!(out, "{}", generate_report(session.tracker()))?;
            Ok(())
        }
        "export" => cmd_export(session, out),
        "init" => cmd_init(session, args, out),
        "icons" => renderer.write_icons(out),
        "shell" => {
            let stdin = std::io::stdin();
            run_shell(session, cfg, renderer, stdin.lock(), out)
        }
        "_commands" => cmd_commands(out),
        "_show" => cmd_show(cfg, out),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Reads commands line by line against one live session until `quit`,
/// `exit`, or end of input, then flushes pending writes.
#[instrument(skip_all)]
pub fn run_shell<R: BufRead, W: Write>(
    session: &mut Session,
    cfg: &Config,
    renderer: &Renderer,
    input: R,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("shell started");
    write!(out, "grit> ")?;
    out.flush()?;

    for line in input.lines() {
        let line = line.context("failed to read shell input")?;
        let line = line.trim();

        if matches!(line, "quit" | "exit") {
            break;
        }

        if !line.is_empty() {
            match Invocation::from_line(cfg, line) {
                Ok(inv) if inv.command == "shell" => {
                    writeln!(out, "already in the shell")?;
                }
                Ok(inv) => {
                    if let Err(err) = dispatch(session, cfg, renderer, inv, out) {
                        writeln!(out, "error: {err:#}")?;
                    }
                }
                Err(err) => writeln!(out, "error: {err:#}")?,
            }
        }

        write!(out, "grit> ")?;
        out.flush()?;
    }

    writeln!(out)?;
    if let Some(outcome) = session.flush_now()?
        && !outcome.is_complete()
    {
        warn!(failed = outcome.failed.len(), "shell exit flush was partial");
    }
    info!("shell finished");
    Ok(())
}

/// Maps a calendar date onto a challenge day, counting `start` as day 1.
/// Dates before `start` have no challenge day.
pub fn challenge_day_on(start: NaiveDate, date: NaiveDate) -> Option<u32> {
    let offset = date.signed_duration_since(start).num_days();
    if offset < 0 {
        return None;
    }
    Some(u32::try_from(offset + 1).unwrap_or(u32::MAX))
}

fn resolve_task(session: &Session, selector: &str) -> anyhow::Result<Task> {
    session
        .tracker()
        .resolve_task(selector)
        .cloned()
        .ok_or_else(|| anyhow!("no task matches: {selector}"))
}

fn require_selectors<'a>(command: &str, args: &'a [String]) -> anyhow::Result<&'a [String]> {
    if args.is_empty() {
        bail!("{command} needs a task id, position, or name");
    }
    Ok(args)
}

#[instrument(skip(session, args, out))]
fn cmd_toggle<W: Write>(session: &mut Session, args: &[String], out: &mut W) -> anyhow::Result<()> {
    for selector in require_selectors("toggle", args)? {
        let task = resolve_task(session, selector)?;
        let done = session.toggle_task(&task.id)?;
        writeln!(
            out,
            "{} {} {}",
            if done { "[x]" } else { "[ ]" },
            task.icon,
            task.name
        )?;
    }
    report_day_state(session, out)
}

#[instrument(skip(session, args, out))]
fn cmd_mark<W: Write>(
    session: &mut Session,
    args: &[String],
    done: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let command = if done { "check" } else { "uncheck" };
    for selector in require_selectors(command, args)? {
        let task = resolve_task(session, selector)?;
        let changed = session.set_task(&task.id, done)?;
        let mark = if done { "[x]" } else { "[ ]" };
        if changed {
            writeln!(out, "{mark} {} {}", task.icon, task.name)?;
        } else {
            writeln!(out, "{mark} {} {} (unchanged)", task.icon, task.name)?;
        }
    }
    report_day_state(session, out)
}

fn report_day_state<W: Write>(session: &Session, out: &mut W) -> anyhow::Result<()> {
    let tracker = session.tracker();
    let day = tracker.current_day();
    if tracker.is_day_completed(day) {
        writeln!(out, "Day {day} crushed.")?;
    }
    Ok(())
}

#[instrument(skip(session, renderer, args, out))]
fn cmd_day<W: Write>(
    session: &mut Session,
    renderer: &Renderer,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let total = session.tracker().total_days();
    let Some(raw) = args.first() else {
        return renderer.write_day(out, session.tracker());
    };

    let day: u32 = raw
        .parse()
        .with_context(|| format!("day must be a number between 1 and {total}, got {raw}"))?;
    if !session.tracker().is_valid_day(day) {
        bail!("day must be between 1 and {total}, got {day}");
    }

    session.go_to_day(day);
    renderer.write_day(out, session.tracker())
}

#[instrument(skip(session, cfg, renderer, out))]
fn cmd_today<W: Write>(
    session: &mut Session,
    cfg: &Config,
    renderer: &Renderer,
    out: &mut W,
) -> anyhow::Result<()> {
    let start = cfg
        .challenge_start()?
        .ok_or_else(|| anyhow!("set challenge.start=YYYY-MM-DD to use `today`"))?;
    let date = Local::now().date_naive();
    let day = challenge_day_on(start, date)
        .ok_or_else(|| anyhow!("the challenge starts on {start}"))?;

    let total = session.tracker().total_days();
    if day > total {
        warn!(day, total, "calendar is past the last challenge day");
    }
    session.go_to_day(day);
    renderer.write_day(out, session.tracker())
}

/// Splits trailing `icon:X` tokens from the rest of the words.
fn split_icon(args: &[String]) -> (String, Option<String>) {
    let mut words = Vec::with_capacity(args.len());
    let mut icon = None;
    for arg in args {
        if let Some(value) = arg.strip_prefix("icon:") {
            icon = Some(value.to_string());
        } else {
            words.push(arg.as_str());
        }
    }
    (words.join(" "), icon)
}

#[instrument(skip(session, args, out))]
fn cmd_add<W: Write>(session: &mut Session, args: &[String], out: &mut W) -> anyhow::Result<()> {
    let (name, icon) = split_icon(args);
    let id = session
        .add_task(&name, icon.as_deref())
        .ok_or_else(|| anyhow!("task name cannot be empty"))?;

    let task = resolve_task(session, &id)?;
    info!(id = %task.id, "task added");
    writeln!(out, "Added {} {} ({})", task.icon, task.name, task.id)?;
    Ok(())
}

#[instrument(skip(session, args, out))]
fn cmd_edit<W: Write>(session: &mut Session, args: &[String], out: &mut W) -> anyhow::Result<()> {
    let (selector, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("edit needs a task and a new name or icon:X"))?;
    let task = resolve_task(session, selector)?;

    let (name, icon) = split_icon(rest);
    if name.trim().is_empty() && icon.is_none() {
        bail!("edit needs a new name or icon:X");
    }
    let name = if name.trim().is_empty() {
        task.name.clone()
    } else {
        name
    };

    if !session.edit_task(&task.id, &name, icon.as_deref()) {
        bail!("task {} was not changed", task.id);
    }
    let edited = resolve_task(session, &task.id)?;
    writeln!(out, "Edited {} {} ({})", edited.icon, edited.name, edited.id)?;
    Ok(())
}

#[instrument(skip(session, args, out))]
fn cmd_delete<W: Write>(session: &mut Session, args: &[String], out: &mut W) -> anyhow::Result<()> {
    let selector = require_selectors("delete", args)?
        .first()
        .ok_or_else(|| anyhow!("delete needs a task"))?;
    let task = resolve_task(session, selector)?;
    let removed = session
        .delete_task(&task.id)
        .ok_or_else(|| anyhow!("no task with id {}", task.id))?;
    writeln!(out, "Deleted {} {} ({})", removed.icon, removed.name, removed.id)?;
    Ok(())
}

fn cmd_export<W: Write>(session: &Session, out: &mut W) -> anyhow::Result<()> {
    let bundle = session.tracker().documents().to_bundle()?;
    let text = serde_json::to_string_pretty(&bundle).context("failed to encode export")?;
    writeln!(out, "{text}")?;
    Ok(())
}

#[instrument(skip(session, args, out))]
fn cmd_init<W: Write>(session: &mut Session, args: &[String], out: &mut W) -> anyhow::Result<()> {
    if !args.is_empty() {
        bail!("init takes no arguments, got: {}", args.join(" "));
    }
    if !session.tracker().tasks().is_empty() {
        bail!("tasks already exist; init only seeds an empty tracker");
    }
    let added = session.add_tasks(starter_tasks());
    info!(added, "seeded starter tasks");
    writeln!(out, "Seeded {added} starter tasks.")?;
    Ok(())
}

fn cmd_commands<W: Write>(out: &mut W) -> anyhow::Result<()> {
    for command in known_command_names() {
        writeln!(out, "{command}")?;
    }
    Ok(())
}

fn cmd_show<W: Write>(cfg: &Config, out: &mut W) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        writeln!(out, "{k}={v}")?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "\
usage: grit [-v|-q] [--data DIR] [--gritrc FILE] [--rc KEY=VALUE] [rc.KEY=VALUE] <command> [args]

  status                      show the active day
  toggle <task>...            flip a task on the active day
  check|uncheck <task>...     set a task done or not done
  day <n> | <n>               go to day n
  next | prev | today         move between days
  add <name> [icon:X]         add a task
  edit <task> [name] [icon:X] rename a task or change its icon
  delete <task>               remove a task
  tasks | icons               list tasks or the icon palette
  heatmap | report | export   progress views
  init                        seed the starter tasks
  shell                       run commands interactively

<task> is an id, a 1-based position, or a task name. Commands may be abbreviated."
    )?;
    Ok(())
}
