//! Recovers the `content` string field from a serialized object that the
//! standard deserializer rejects (raw control characters, truncated tails,
//! trailing garbage after the value).
//!
//! Single forward pass over the input. The value ends at the first unescaped
//! quote that is followed by `,"` (next key) or `}` (end of object).

use thiserror::Error;
use tracing::debug;

const CONTENT_MARKER: &str = "\"content\":\"";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("no `\"content\":\"` field in payload")]
    FieldNotFound,
    #[error("content field never terminated ({scanned} chars scanned, {quotes} unescaped quotes)")]
    UnterminatedField { scanned: usize, quotes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Searching,
    InValue,
    EscapeNext,
}

pub fn repair_content_field(raw: &str) -> Result<String, RepairError> {
    let mut state = State::Searching;
    let mut value_start = 0;
    let mut scanned = 0usize;
    let mut quotes = 0usize;

    for (i, ch) in raw.char_indices() {
        match state {
            State::Searching => {
                if i >= value_start && raw[i..].starts_with(CONTENT_MARKER) {
                    value_start = i + CONTENT_MARKER.len();
                    state = State::InValue;
                    debug!(offset = value_start, "content marker found");
                }
            }
            _ if i < value_start => {}
            State::EscapeNext => {
                scanned += 1;
                state = State::InValue;
            }
            State::InValue => {
                scanned += 1;
                match ch {
                    '\\' => state = State::EscapeNext,
                    '"' => {
                        quotes += 1;
                        let rest = &raw[i + 1..];
                        if rest.starts_with(",\"") || rest.starts_with('}') {
                            debug!(scanned, quotes, "content value terminated");
                            return Ok(unescape_limited(&raw[value_start..i]));
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    match state {
        State::Searching => Err(RepairError::FieldNotFound),
        _ => Err(RepairError::UnterminatedField { scanned, quotes }),
    }
}

/// Decode `\"`, `\n` and `\t` only; any other escape is kept as written.
fn unescape_limited(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
