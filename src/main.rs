use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use globset::GlobSet;
use is_terminal::IsTerminal;

mod commands;
mod diff;
mod files;
mod logging;
mod transform;
use commands::{Substitution, run_replace};
use diff::DiffDisplayConfig;
use files::{FileEntry, build_exclude_globs, walk_files};
use logging::{FileAction, record_change};
use transform::TransformResult;

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Default)]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "vsc-replacer",
    version,
    about = "A tool to replace regex matches in files"
)]
struct Cli {
    /// Regular expression with capture groups
    #[arg(long, value_name = "PATTERN", allow_hyphen_values = true)]
    regex: String,
    /// Replacement string; `$1` or `${name}` insert capture groups
    #[arg(long, value_name = "TEXT", allow_hyphen_values = true)]
    replacement: String,
    /// Directory with files
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    dir: PathBuf,
    /// Print per-line diffs instead of writing files
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Only rewrite files whose content changed
    #[arg(long = "only-changed", action = ArgAction::SetTrue)]
    only_changed: bool,
    #[arg(long = "color", value_enum, default_value = "auto")]
    color: ColorChoice,
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
    /// Append one JSON line per processed file to this log
    #[arg(long = "change-log", value_name = "FILE", value_hint = ValueHint::FilePath)]
    change_log: Option<PathBuf>,
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

/// Everything a run needs, resolved once before any file is touched.
#[derive(Debug)]
struct ReplaceConfig {
    substitution: Substitution,
    root: PathBuf,
    dry_run: bool,
    only_changed: bool,
    display: DiffDisplayConfig,
    exclude: Option<GlobSet>,
    change_log: Option<PathBuf>,
    verbose: bool,
}

impl ReplaceConfig {
    fn from_cli(cli: Cli) -> Result<Self> {
        let substitution = Substitution::new(&cli.regex, &cli.replacement)?;
        let exclude = build_exclude_globs(&cli.exclude)?;
        Ok(Self {
            substitution,
            root: cli.dir,
            dry_run: cli.dry_run,
            only_changed: cli.only_changed,
            display: DiffDisplayConfig {
                colorize: cli.color.should_color(),
            },
            exclude,
            change_log: cli.change_log,
            verbose: cli.verbose,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CommandStats {
    files: usize,
    changed: usize,
    written: usize,
    skipped: usize,
    dry_run: usize,
}

impl CommandStats {
    fn print(&self, label: &str) {
        if self.files == 0 {
            return;
        }
        eprintln!(
            "{label} summary: files={}, changed={}, written={}, skipped={}, dry-run={}",
            self.files, self.changed, self.written, self.skipped, self.dry_run
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ReplaceConfig::from_cli(cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stats = run(&config, &mut out)?;
    stats.print("replace");
    Ok(())
}

fn run<W: Write>(config: &ReplaceConfig, out: &mut W) -> Result<CommandStats> {
    if config.verbose {
        eprintln!(
            "replace: pattern={} root={} mode={}",
            config.substitution.pattern(),
            config.root.display(),
            if config.dry_run { "dry-run" } else { "write" }
        );
    }

    run_entries(config, walk_files(&config.root, config.exclude.clone()), out)
}

fn run_entries<W, I>(config: &ReplaceConfig, entries: I, out: &mut W) -> Result<CommandStats>
where
    W: Write,
    I: IntoIterator<Item = Result<FileEntry>>,
{
    let mut stats = CommandStats::default();
    for entry in entries {
        let entry = entry?;
        process_file(config, &entry, out, &mut stats)?;
    }
    Ok(stats)
}

fn process_file<W: Write>(
    config: &ReplaceConfig,
    entry: &FileEntry,
    out: &mut W,
    stats: &mut CommandStats,
) -> Result<()> {
    let label = entry.label();
    let result = run_replace(entry, &config.substitution)?;
    stats.files += 1;
    if result.changed() {
        stats.changed += 1;
    }

    if config.dry_run {
        let file_diff = diff::diff_lines(&result.original, &result.replaced);
        if file_diff.truncated() {
            eprintln!(
                "warning: {label} has {} lines before and {} after; lines past {} were not compared",
                file_diff.original_lines,
                file_diff.replaced_lines,
                file_diff.original_lines.min(file_diff.replaced_lines)
            );
        }
        diff::write_blocks(out, &label, &file_diff, &config.display)?;
        stats.dry_run += 1;
        if config.verbose {
            eprintln!("dry-run {label} ({} matches)", result.matches);
        }
        log_change(
            config,
            &label,
            FileAction::DryRun,
            &diff::summarize_lines(&file_diff),
        )?;
        return Ok(());
    }

    if config.only_changed && !result.changed() {
        stats.skipped += 1;
        if config.verbose {
            eprintln!("skipped {label} (no changes)");
        }
        return log_change(config, &label, FileAction::Skipped, "no matches");
    }

    apply_transform(entry, &result)?;
    stats.written += 1;
    if config.verbose {
        eprintln!("rewrote {label} ({} matches)", result.matches);
    }
    let action = if result.changed() {
        FileAction::Rewritten
    } else {
        FileAction::Unchanged
    };
    let summary = format!("{} matches", result.matches);
    log_change(config, &label, action, &summary)
}

fn log_change(config: &ReplaceConfig, label: &str, action: FileAction, summary: &str) -> Result<()> {
    match &config.change_log {
        Some(log_path) => record_change(log_path, "replace", label, action, summary),
        None => Ok(()),
    }
}

fn apply_transform(entry: &FileEntry, result: &TransformResult) -> Result<()> {
    write_in_place(&entry.path, &result.replaced, &entry.permissions)
        .with_context(|| format!("failed to write to file {}", entry.path.display()))
}

/// Truncates and rewrites the existing file, so its inode, owner and links survive.
fn write_in_place(path: &Path, data: &[u8], permissions: &Permissions) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("opening {} for writing", path.display()))?;
    file.write_all(data)
        .with_context(|| format!("writing {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("syncing {}", path.display()))?;
    fs::set_permissions(path, permissions.clone())
        .with_context(|| format!("setting permissions on {}", path.display()))?;
    Ok(())
}
