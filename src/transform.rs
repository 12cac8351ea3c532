use std::fs;

use anyhow::{Context, Result};

use crate::files::FileEntry;

pub struct TransformContext<'a> {
    pub entry: &'a FileEntry,
}

/// One file's content before and after a transformation. Dropped once the file is handled.
pub struct TransformResult {
    pub original: Vec<u8>,
    pub replaced: Vec<u8>,
    pub matches: usize,
}

impl TransformResult {
    pub fn changed(&self) -> bool {
        self.original != self.replaced
    }
}

pub fn run_transform<F>(ctx: &TransformContext<'_>, transformer: F) -> Result<TransformResult>
where
    F: Fn(&[u8]) -> (Vec<u8>, usize),
{
    let original = fs::read(&ctx.entry.path)
        .with_context(|| format!("failed to read file {}", ctx.entry.path.display()))?;
    let (replaced, matches) = transformer(&original);

    Ok(TransformResult {
        original,
        replaced,
        matches,
    })
}
