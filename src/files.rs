use std::fs::{self, Permissions};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub permissions: Permissions,
}

impl FileEntry {
    /// Path as shown in diff headers and messages, without a leading `./`.
    pub fn label(&self) -> String {
        display_label(&self.path)
    }
}

/// Lazily walks `root`, yielding every regular file. The first error ends the walk.
pub struct FileWalker {
    inner: walkdir::IntoIter,
    root: PathBuf,
    exclude: Option<GlobSet>,
    failed: bool,
}

pub fn walk_files(root: &Path, exclude: Option<GlobSet>) -> FileWalker {
    let inner = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    FileWalker {
        inner,
        root: root.to_path_buf(),
        exclude,
        failed: false,
    }
}

impl Iterator for FileWalker {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.failed = true;
                    let path = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(unknown path)".into());
                    return Some(Err(anyhow::Error::new(err).context(format!("walking {path}"))));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if should_skip(&path, &self.root, self.exclude.as_ref()) {
                continue;
            }

            return match fs::metadata(&path) {
                Ok(metadata) => Some(Ok(FileEntry {
                    permissions: metadata.permissions(),
                    path,
                })),
                Err(err) => {
                    self.failed = true;
                    Some(Err(err).with_context(|| format!("metadata for {}", path.display())))
                }
            };
        }
    }
}

/// Exclude globs are matched against the path relative to the walk root.
fn should_skip(path: &Path, root: &Path, exclude: Option<&GlobSet>) -> bool {
    let Some(set) = exclude else {
        return false;
    };
    let relative = path.strip_prefix(root).unwrap_or(path);
    set.is_match(normalize_slashes(relative).as_str())
}

fn normalize_slashes(path: &Path) -> String {
    display_label(path).replace('\\', "/")
}

pub fn display_label(path: &Path) -> String {
    let mut components = path.components().peekable();
    while matches!(components.peek(), Some(Component::CurDir)) {
        components.next();
    }
    let trimmed: PathBuf = components.collect();
    if trimmed.as_os_str().is_empty() {
        return path.display().to_string();
    }
    trimmed.display().to_string()
}

pub fn build_exclude_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).map_err(|err| anyhow!("invalid exclude glob '{pattern}': {err}"))?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|err| anyhow!("unable to build exclude globs: {err}"))
}
