use anyhow::{Result, anyhow};
use regex::bytes::{Captures, Regex};

use crate::files::FileEntry;
use crate::transform::{TransformContext, TransformResult, run_transform};

/// Compiled pattern plus replacement template, shared read-only by every file in a run.
#[derive(Debug, Clone)]
pub struct Substitution {
    regex: Regex,
    template: String,
}

impl Substitution {
    pub fn new(pattern: &str, template: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|err| anyhow!("failed to compile regular expression: {err}"))?;
        Ok(Self {
            regex,
            template: template.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Replaces every non-overlapping match, expanding `$N`/`${name}` group references.
    /// Returns the new content and the number of matches.
    pub fn apply(&self, content: &[u8]) -> (Vec<u8>, usize) {
        let mut matches = 0usize;
        let template = self.template.as_bytes();
        let replaced = self.regex.replace_all(content, |caps: &Captures<'_>| {
            matches += 1;
            let mut output = Vec::new();
            caps.expand(template, &mut output);
            output
        });
        (replaced.into_owned(), matches)
    }
}

pub fn run_replace(entry: &FileEntry, substitution: &Substitution) -> Result<TransformResult> {
    let context = TransformContext { entry };

    run_transform(&context, |original| substitution.apply(original))
}
