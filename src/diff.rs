use std::borrow::Cow;
use std::io::Write;

use anyhow::Result;
use similar::{Algorithm, ChangeTag, TextDiff};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffDisplayConfig {
    pub colorize: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub tag: ChangeTag,
    pub text: String,
}

/// Character-level edit script for one changed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    /// 1-based line number in the original file.
    pub line_number: usize,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub blocks: Vec<LineDiff>,
    pub original_lines: usize,
    pub replaced_lines: usize,
}

impl FileDiff {
    /// Lines beyond the shorter side are never compared.
    pub fn truncated(&self) -> bool {
        self.original_lines != self.replaced_lines
    }
}

/// Splits on `\n`, dropping one trailing `\r` per line and any empty final line.
pub fn split_lines(content: &[u8]) -> Vec<Cow<'_, str>> {
    let text = String::from_utf8_lossy(content);
    match text {
        Cow::Borrowed(text) => text.lines().map(Cow::Borrowed).collect(),
        Cow::Owned(text) => text.lines().map(|line| Cow::Owned(line.to_string())).collect(),
    }
}

pub fn diff_lines(original: &[u8], replaced: &[u8]) -> FileDiff {
    let old_lines = split_lines(original);
    let new_lines = split_lines(replaced);

    let blocks = old_lines
        .iter()
        .zip(new_lines.iter())
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(idx, (old, new))| LineDiff {
            line_number: idx + 1,
            spans: char_spans(old, new),
        })
        .collect();

    FileDiff {
        blocks,
        original_lines: old_lines.len(),
        replaced_lines: new_lines.len(),
    }
}

fn char_spans(old: &str, new: &str) -> Vec<Span> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(old, new);

    let mut spans: Vec<Span> = Vec::new();
    for change in diff.iter_all_changes() {
        let tag = change.tag();
        match spans.last_mut() {
            Some(last) if last.tag == tag => last.text.push_str(change.value()),
            _ => spans.push(Span {
                tag,
                text: change.value().to_string(),
            }),
        }
    }
    spans
}

pub fn render_spans(spans: &[Span], config: &DiffDisplayConfig) -> String {
    let mut out = String::new();
    for span in spans {
        match (span.tag, config.colorize) {
            (ChangeTag::Equal, _) => out.push_str(&span.text),
            (ChangeTag::Delete, true) => {
                out.push_str(RED);
                out.push_str(&span.text);
                out.push_str(RESET);
            }
            (ChangeTag::Insert, true) => {
                out.push_str(GREEN);
                out.push_str(&span.text);
                out.push_str(RESET);
            }
            (ChangeTag::Delete, false) => {
                out.push_str("[-");
                out.push_str(&span.text);
                out.push_str("-]");
            }
            (ChangeTag::Insert, false) => {
                out.push_str("{+");
                out.push_str(&span.text);
                out.push_str("+}");
            }
        }
    }
    out
}

pub fn write_blocks<W: Write>(
    out: &mut W,
    label: &str,
    diff: &FileDiff,
    config: &DiffDisplayConfig,
) -> Result<()> {
    for block in &diff.blocks {
        let n = block.line_number;
        writeln!(out, "--- a/{label}:{n}")?;
        writeln!(out, "+++ b/{label}:{n}")?;
        writeln!(out, "{}", render_spans(&block.spans, config))?;
        writeln!(out, "---")?;
    }
    out.flush()?;
    Ok(())
}

pub fn summarize_lines(diff: &FileDiff) -> String {
    if diff.blocks.is_empty() {
        return "no line changes".to_string();
    }
    let numbers: Vec<String> = diff
        .blocks
        .iter()
        .map(|block| block.line_number.to_string())
        .collect();
    format!("lines {}", numbers.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: DiffDisplayConfig = DiffDisplayConfig { colorize: false };

    fn render(original: &str, replaced: &str, label: &str) -> String {
        let diff = diff_lines(original.as_bytes(), replaced.as_bytes());
        let mut out = Vec::new();
        write_blocks(&mut out, label, &diff, &PLAIN).expect("render");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn only_changed_lines_produce_blocks() {
        let output = render("foo\nbar\n", "baz\nbar\n", "t.txt");
        assert!(output.starts_with("--- a/t.txt:1\n+++ b/t.txt:1\n"));
        assert!(output.ends_with("\n---\n"));
        assert!(!output.contains(":2"));
    }

    #[test]
    fn block_layout_for_insertion() {
        assert_eq!(
            render("ab\n", "aXb\n", "dir/f.rs"),
            "--- a/dir/f.rs:1\n+++ b/dir/f.rs:1\na{+X+}b\n---\n"
        );
    }

    #[test]
    fn deletion_is_marked() {
        assert_eq!(
            render("keep\naXb\n", "keep\nab\n", "f"),
            "--- a/f:2\n+++ b/f:2\na[-X-]b\n---\n"
        );
    }

    #[test]
    fn blocks_follow_line_order() {
        let output = render("x1\nsame\nx3\n", "y1\nsame\ny3\n", "f");
        let first = output.find("--- a/f:1").expect("line 1 block");
        let third = output.find("--- a/f:3").expect("line 3 block");
        assert!(first < third);
        assert!(!output.contains("f:2"));
    }

    #[test]
    fn identical_content_renders_nothing() {
        assert_eq!(render("same\n", "same\n", "f"), "");
    }

    #[test]
    fn line_count_mismatch_truncates_to_shorter_side() {
        let diff = diff_lines(b"a b\nc\n", b"a\nb\nc\n");
        assert!(diff.truncated());
        assert_eq!(diff.original_lines, 2);
        assert_eq!(diff.replaced_lines, 3);
        let numbers: Vec<usize> = diff.blocks.iter().map(|b| b.line_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn split_lines_matches_scanner_rules() {
        let lines = split_lines(b"one\r\ntwo\n\nthree");
        assert_eq!(lines, vec!["one", "two", "", "three"]);
        assert!(split_lines(b"").is_empty());
    }

    #[test]
    fn colour_uses_ansi_escapes() {
        let spans = vec![
            Span {
                tag: ChangeTag::Equal,
                text: "a".into(),
            },
            Span {
                tag: ChangeTag::Delete,
                text: "b".into(),
            },
            Span {
                tag: ChangeTag::Insert,
                text: "c".into(),
            },
        ];
        let rendered = render_spans(&spans, &DiffDisplayConfig { colorize: true });
        assert_eq!(rendered, "a\x1b[31mb\x1b[0m\x1b[32mc\x1b[0m");
    }

    #[test]
    fn adjacent_changes_merge_into_one_span() {
        let spans = char_spans("prefix-old", "prefix-new");
        assert_eq!(spans.first().map(|s| s.text.as_str()), Some("prefix-"));
        assert!(spans.iter().all(|s| !s.text.is_empty()));
        let retained: String = spans
            .iter()
            .filter(|s| s.tag != ChangeTag::Insert)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(retained, "prefix-old");
    }

    #[test]
    fn summary_lists_changed_lines() {
        let diff = diff_lines(b"a\nb\nc\n", b"A\nb\nC\n");
        assert_eq!(summarize_lines(&diff), "lines 1,3");
    }
}
