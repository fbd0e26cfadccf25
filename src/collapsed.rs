//! Collapsed ("folded") stack parsing.
//!
//! Lines look like `frame;frame;...;frame <count>`. Lines starting with `#`
//! are comments; the artifact header lives in one of them.

use std::path::Path;

use crate::{MergeResult, Pid, ProcessToStackSampleCounters, StackToSampleCount};

const MAX_REPORTED_BAD_LINES: usize = 8;

/// Parses a single process's collapsed listing.
///
/// When `add_comm` is set it becomes the root frame of every stack.
pub fn parse_one_collapsed(collapsed: &str, add_comm: Option<&str>) -> StackToSampleCount {
    let mut stacks = StackToSampleCount::new();

    for line in collapsed.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let (stack, count) = line.rsplit_once(' ').unwrap_or(("", line));
        let count = match count.parse::<u64>() {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("bad stack - line={line:?}: {err}");
                continue;
            }
        };
        match add_comm {
            Some(comm) => stacks.add(format!("{comm};{stack}"), count),
            None => stacks.add(stack, count),
        }
    }

    stacks
}

pub fn parse_one_collapsed_file(path: &Path, add_comm: Option<&str>) -> MergeResult<StackToSampleCount> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_one_collapsed(&text, add_comm))
}

/// Parses a listing whose stacks start with `<comm>-<pid>/<tid>`, bucketing
/// them by pid. The identity frame is rewritten to just `<comm>`.
pub fn parse_many_collapsed(text: &str) -> ProcessToStackSampleCounters {
    let mut results = ProcessToStackSampleCounters::new();
    let mut bad_lines = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match split_process_line(line) {
            Some((pid, stack, count)) => results.entry(pid).or_default().add(stack, count),
            None => bad_lines.push(line),
        }
    }

    if !bad_lines.is_empty() {
        tracing::warn!("{}", bad_lines_report(&bad_lines));
    }

    results
}

fn bad_lines_report(bad_lines: &[&str]) -> String {
    let shown = bad_lines.len().min(MAX_REPORTED_BAD_LINES);
    format!(
        "Got {} bad lines when parsing (showing up to {MAX_REPORTED_BAD_LINES}):\n{}",
        bad_lines.len(),
        bad_lines[..shown].join("\n")
    )
}

fn split_process_line(line: &str) -> Option<(Pid, String, u64)> {
    let (stack, count) = line.rsplit_once(' ')?;
    let count = count.parse::<u64>().ok()?;
    let (comm_pid_tid, stack) = stack.split_once(';')?;
    let (comm, pid_tid) = comm_pid_tid.rsplit_once('-')?;
    let pid = pid_tid.split('/').next()?.parse::<Pid>().ok()?;
    Some((pid, format!("{comm};{stack}"), count))
}
