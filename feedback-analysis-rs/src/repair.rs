//! Best-effort recovery of JSON cut off mid-structure.
//!
//! Targets output truncated by an output-size ceiling. It balances open
//! strings, arrays and objects; it is not a general JSON fixer and a
//! repaired document may still fail validation.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StageError;

/// A parsed stage-two document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub value: Value,
    /// Parsing only succeeded after [`repair_json`]
    pub repaired: bool,
}

/// Drop a surrounding Markdown code fence and any prose before the document
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // skip the info string ("json")
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }
    match text.find(&['{', '['][..]) {
        Some(start) => &text[start..],
        None => text,
    }
}

/// Parse stage-two output, repairing it if the direct parse hits a syntax
/// error or premature end of input
pub fn parse_or_repair(raw: &str) -> Result<ParsedResponse, StageError> {
    let text = strip_code_fence(raw);

    let parse_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(ParsedResponse { value, repaired: false }),
        Err(e) => e,
    };

    if !(parse_error.is_syntax() || parse_error.is_eof()) {
        return Err(StageError::Malformed(parse_error.to_string()));
    }

    debug!(
        error = %parse_error,
        chars = text.chars().count(),
        "Malformed JSON response, attempting repair"
    );

    match repair_json(text).and_then(|fixed| serde_json::from_str::<Value>(&fixed).ok()) {
        Some(value) => {
            debug!("JSON repair succeeded");
            Ok(ParsedResponse { value, repaired: true })
        }
        None => {
            warn!(error = %parse_error, "JSON repair failed");
            Err(StageError::Unrepairable(parse_error.to_string()))
        }
    }
}

#[derive(Debug, Default)]
struct Scan {
    /// Closers owed, innermost last
    stack: Vec<char>,
    in_string: bool,
    /// Last character inside the open string was an unconsumed backslash
    escaped: bool,
    /// Byte offset where the prefix was last complete, with the closers owed there
    safe_point: Option<(usize, Vec<char>)>,
}

fn scan(text: &str) -> Scan {
    let mut state = Scan::default();

    for (i, c) in text.char_indices() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if c == '\\' {
                state.escaped = true;
            } else if c == '"' {
                state.in_string = false;
            }
            continue;
        }

        match c {
            '"' => state.in_string = true,
            '{' | '[' => {
                state.stack.push(if c == '{' { '}' } else { ']' });
                state.safe_point = Some((i + 1, state.stack.clone()));
            }
            '}' | ']' => {
                if state.stack.last() == Some(&c) {
                    state.stack.pop();
                    state.safe_point = Some((i + 1, state.stack.clone()));
                }
            }
            ',' if !state.stack.is_empty() => {
                state.safe_point = Some((i, state.stack.clone()));
            }
            _ => {}
        }
    }

    state
}

fn close(mut text: String, owed: &[char]) -> String {
    text.extend(owed.iter().rev());
    text
}

/// Close whatever `text` left open
///
/// First closes an open string (dropping a dangling escape character) and
/// appends the owed closers innermost first. If that does not parse, cuts
/// back to the last point where the prefix was complete and closes from
/// there. Returns `None` when neither produces valid JSON.
pub fn repair_json(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let state = scan(text);

    let mut balanced = text.to_string();
    if state.in_string {
        if state.escaped {
            balanced.pop();
        }
        balanced.push('"');
    } else {
        let trimmed = balanced.trim_end().trim_end_matches(',').len();
        balanced.truncate(trimmed);
    }
    let balanced = close(balanced, &state.stack);
    if serde_json::from_str::<Value>(&balanced).is_ok() {
        return Some(balanced);
    }

    let (offset, owed) = state.safe_point?;
    let cut = close(text[..offset].trim_end().to_string(), &owed);
    serde_json::from_str::<Value>(&cut).ok().map(|_| cut)
}
