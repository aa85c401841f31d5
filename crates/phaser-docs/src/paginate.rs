//! Character-based pagination of converted Markdown
//!
//! Offsets and lengths count Unicode scalar values. Chunk ends never split a
//! combining sequence, a zero-width-joiner sequence or a CRLF pair.

use crate::error::DocsError;

const ZERO_WIDTH_JOINER: char = '\u{200D}';

/// One page of a longer text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Offset of the chunk, in characters
    pub start_index: usize,
    /// Length of the chunk, in characters
    pub char_len: usize,
    /// True iff content remains past the end of this chunk
    pub has_more: bool,
    /// Length of the whole text, in characters
    pub total_chars: usize,
}

impl Chunk {
    /// Offset to request next, if there is more
    pub fn next_start_index(&self) -> Option<usize> {
        self.has_more.then_some(self.start_index + self.char_len)
    }
}

/// Slices text into chunks at safe character boundaries
#[derive(Debug, Clone, Copy, Default)]
pub struct Paginator;

impl Paginator {
    /// Return up to `max_length` characters of `text` starting at `start_index`
    ///
    /// When the requested end falls inside a combining sequence the end snaps
    /// back to the preceding boundary; if that would leave nothing, it extends
    /// forward past the sequence instead.
    pub fn slice(text: &str, start_index: i64, max_length: i64) -> Result<Chunk, DocsError> {
        let (start, max_length) = Self::check(start_index, max_length)?;
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if start >= total {
            return Ok(Chunk {
                text: String::new(),
                start_index: start,
                char_len: 0,
                has_more: false,
                total_chars: total,
            });
        }

        let requested_end = start.saturating_add(max_length).min(total);
        let mut end = requested_end;
        while end > start && !is_boundary(&chars, end) {
            end -= 1;
        }
        if end == start {
            end = requested_end;
            while end < total && !is_boundary(&chars, end) {
                end += 1;
            }
        }

        Ok(Chunk {
            text: chars[start..end].iter().collect(),
            start_index: start,
            char_len: end - start,
            has_more: end < total,
            total_chars: total,
        })
    }

    /// Validate pagination parameters without slicing anything
    pub fn check(start_index: i64, max_length: i64) -> Result<(usize, usize), DocsError> {
        let start = usize::try_from(start_index).map_err(|_| {
            DocsError::InvalidArgument("start_index must be non-negative".to_string())
        })?;
        if max_length <= 0 {
            return Err(DocsError::InvalidArgument(
                "max_length must be positive".to_string(),
            ));
        }
        Ok((start, usize::try_from(max_length).unwrap_or(usize::MAX)))
    }
}

/// Whether a chunk may end between `chars[i - 1]` and `chars[i]`
fn is_boundary(chars: &[char], i: usize) -> bool {
    if i == 0 || i >= chars.len() {
        return true;
    }
    let prev = chars[i - 1];
    let next = chars[i];
    !(is_extending(next)
        || next == ZERO_WIDTH_JOINER
        || prev == ZERO_WIDTH_JOINER
        || (prev == '\r' && next == '\n'))
}

/// Combining marks and variation selectors attach to the preceding character
fn is_extending(c: char) -> bool {
    matches!(
        c,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FE20}'..='\u{FE2F}'
            | '\u{E0100}'..='\u{E01EF}'
    )
}
