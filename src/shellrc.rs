// SPDX-License-Identifier: MIT
//! Managed blocks in shell profiles and other dotfiles.
//!
//! Every line devup writes into a user-owned file sits between a named pair
//! of marker comments. Re-running replaces the block in place instead of
//! appending a second copy, so profiles stay clean across any number of runs.

use std::path::Path;

use anyhow::{bail, Context, Result};

// ─── Markers ──────────────────────────────────────────────────────────────────

/// First line of the managed block for `name`. Doubles as the presence
/// marker step preconditions look for.
pub fn begin_marker(name: &str) -> String {
    format!("# >>> devup {name} >>>")
}

fn end_marker(name: &str) -> String {
    format!("# <<< devup {name} <<<")
}

/// What `ensure_block` did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockChange {
    /// No block existed; one was appended.
    Inserted,
    /// A block existed with different content; it was rewritten in place.
    Replaced,
    /// A block existed with identical content; the file was left untouched.
    Unchanged,
}

// ─── ensure_block ─────────────────────────────────────────────────────────────

/// Write `content` between `# >>> devup {name} >>>` and `# <<< devup {name} <<<`
/// in `path`, creating the file if needed. Idempotent: a second call with the
/// same content is a no-op, a call with new content replaces the old block.
pub fn ensure_block(path: &Path, name: &str, content: &str) -> Result<BlockChange> {
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };

    let begin = begin_marker(name);
    let end = end_marker(name);
    let body = content.trim_end_matches('\n');
    let block = format!("{begin}\n{body}\n{end}\n");

    let (updated, change) = match find_block(&existing, &begin, &end)? {
        Some((start, stop)) => {
            if existing[start..stop] == block {
                return Ok(BlockChange::Unchanged);
            }
            let mut text = String::with_capacity(existing.len() + block.len());
            text.push_str(&existing[..start]);
            text.push_str(&block);
            text.push_str(&existing[stop..]);
            (text, BlockChange::Replaced)
        }
        None => {
            let mut text = existing;
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&block);
            (text, BlockChange::Inserted)
        }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, updated)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(change)
}

/// Byte range of the managed block (begin marker line through the newline
/// after the end marker). Markers only match as whole lines, so a commented
/// mention of the marker elsewhere is ignored.
fn find_block(text: &str, begin: &str, end: &str) -> Result<Option<(usize, usize)>> {
    let start = match line_position(text, begin) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let after_begin = start + begin.len();
    match line_position(&text[after_begin..], end) {
        Some(rel) => {
            let end_line = after_begin + rel;
            let stop = match text[end_line..].find('\n') {
                Some(nl) => end_line + nl + 1,
                None => text.len(),
            };
            Ok(Some((start, stop)))
        }
        // An unpaired begin marker leaves the block boundary ambiguous.
        None => bail!("unterminated devup block (`{begin}` without `{end}`)"),
    }
}

/// Byte offset of `line` occurring as a full line of `text`.
fn line_position(text: &str, line: &str) -> Option<usize> {
    let mut offset = 0;
    for candidate in text.split_inclusive('\n') {
        if candidate.trim_end_matches('\n') == line {
            return Some(offset);
        }
        offset += candidate.len();
    }
    None
}
