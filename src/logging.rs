use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const MAX_ENTRIES: usize = 500;

#[derive(Debug, Serialize)]
pub struct ChangeLogEntry<'a> {
    pub timestamp: &'a str,
    pub command: &'a str,
    pub path: &'a str,
    pub action: &'a str,
    #[serde(rename = "lines")]
    pub line_info: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    DryRun,
    Rewritten,
    Unchanged,
    Skipped,
}

impl FileAction {
    pub fn label(self) -> &'static str {
        match self {
            FileAction::DryRun => "dry-run",
            FileAction::Rewritten => "rewritten",
            FileAction::Unchanged => "unchanged",
            FileAction::Skipped => "skipped",
        }
    }
}

pub fn record_change(
    log_path: &Path,
    command: &str,
    path: &str,
    action: FileAction,
    line_info: &str,
) -> Result<()> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let entry = ChangeLogEntry {
        timestamp: &timestamp,
        command,
        path,
        action: action.label(),
        line_info,
    };
    let json = serde_json::to_string(&entry)?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_path)
        .with_context(|| format!("opening change log {}", log_path.display()))?;
    writeln!(file, "{json}")?;
    drop(file);
    compact_log(log_path)?;
    Ok(())
}

/// Rewrites the log with only its newest `MAX_ENTRIES` lines once it grows past that.
fn compact_log(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
    let mut newest: VecDeque<String> = VecDeque::with_capacity(MAX_ENTRIES + 1);
    let mut total = 0usize;
    for line in BufReader::new(file).lines() {
        newest.push_back(line.with_context(|| format!("reading {}", path.display()))?);
        total += 1;
        if newest.len() > MAX_ENTRIES {
            newest.pop_front();
        }
    }
    if total <= MAX_ENTRIES {
        return Ok(());
    }

    let mut kept = String::new();
    for line in &newest {
        kept.push_str(line);
        kept.push('\n');
    }
    fs::write(path, kept).with_context(|| format!("compacting {}", path.display()))?;
    Ok(())
}
