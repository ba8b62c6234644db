//! Span-based text edits.
//!
//! Rewriters record `(start, end, replacement)` spans against the original
//! source and apply them in one pass. Edits are applied in reverse offset
//! order, so earlier offsets stay valid and no line bookkeeping is needed.

use crate::error::Result;
use std::path::Path;

/// Replace `source[start..end]` with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Edit {
            start,
            end,
            replacement: replacement.into(),
        }
    }
}

/// Applies non-overlapping edits to `source`, returning the new text.
///
/// Edits that fall outside the source or split a character are skipped.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    // Sort by start offset descending so we can apply from end to start
    edits.sort_by(|a, b| b.start.cmp(&a.start));

    let mut result = source.to_string();
    for edit in edits {
        let valid = edit.start <= edit.end
            && edit.end <= result.len()
            && result.is_char_boundary(edit.start)
            && result.is_char_boundary(edit.end);
        if !valid {
            tracing::warn!(start = edit.start, end = edit.end, "skipping out-of-range edit");
            continue;
        }
        result.replace_range(edit.start..edit.end, &edit.replacement);
    }

    result
}

/// Rewrites a file in place with `rewrite`, returning whether it changed.
///
/// The file is only written when the output differs from the input.
pub fn rewrite_file<F>(file: &Path, rewrite: F) -> Result<bool>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>>,
{
    let content = std::fs::read(file)?;
    let new_content = rewrite(&content)?;
    if new_content == content {
        return Ok(false);
    }
    std::fs::write(file, new_content)?;
    Ok(true)
}
