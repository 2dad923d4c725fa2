//! Recovery of JSON objects embedded in product page markup.
//!
//! Product pages carry their pricing data as object literals assigned to a
//! handful of well known keys inside inline scripts. The markup around them
//! is not reliable enough to delimit the object, so the object is recovered
//! by balanced brace matching from the first `{` after the key.

use std::sync::LazyLock;

use serde_json::{Map, Value};
use tracing::debug;

/// Scan bound, in characters from the opening brace.
pub const DEFAULT_MAX_SCAN: usize = 500_000;

static PRODUCT_ID: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#""productId"\s*:\s*"(\d+)""#).unwrap());

/// Depth-counting scanner over a bounded window of text.
///
/// Braces inside string literals are counted like any other brace.
#[derive(Debug, Clone, Copy)]
pub struct BraceScanner {
    max_scan: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Open { depth: usize },
    Closed { end: usize },
}

impl BraceScanner {
    pub fn new(max_scan: usize) -> Self {
        Self { max_scan }
    }

    /// Byte offset of the brace closing the object opened at `open`.
    ///
    /// `open` must point at a `{`. Returns `None` when depth does not come
    /// back to zero within the scan bound.
    pub fn matching_close(&self, text: &str, open: usize) -> Option<usize> {
        let window = text.get(open..)?;
        if !window.starts_with('{') {
            return None;
        }
        let mut state = ScanState::Open { depth: 0 };
        for (offset, c) in window.char_indices().take(self.max_scan) {
            let ScanState::Open { depth } = state else {
                break;
            };
            state = match c {
                '{' => ScanState::Open { depth: depth + 1 },
                '}' if depth == 1 => ScanState::Closed {
                    end: open + offset,
                },
                '}' => ScanState::Open {
                    depth: depth.saturating_sub(1),
                },
                _ => state,
            };
        }
        match state {
            ScanState::Closed { end } => Some(end),
            ScanState::Open { .. } => None,
        }
    }
}

impl Default for BraceScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCAN)
    }
}

fn locate_key(text: &str, key: &str) -> Option<usize> {
    text.find(key)
        .or_else(|| text.find(&format!("\"{key}\"")))
}

fn parse_candidate(candidate: &str) -> Option<Map<String, Value>> {
    let cleaned = candidate
        .replace(['\n', '\r'], "")
        .replace("\\\"", "\"");
    let parsed = serde_json::from_str::<Value>(&cleaned)
        .inspect_err(|error| debug!(%error, "strict parse failed, retrying with double quotes"))
        .or_else(|_| serde_json::from_str::<Value>(&candidate.replace('\'', "\"")))
        .ok()?;
    match parsed {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Extract the object literal following `key` in `text`.
///
/// Absence and malformed content both come back as `None`.
pub fn extract_object(text: &str, key: &str, scanner: BraceScanner) -> Option<Map<String, Value>> {
    let key_at = locate_key(text, key)?;
    let open = key_at + text[key_at..].find('{')?;
    let Some(close) = scanner.matching_close(text, open) else {
        debug!(key, open, "object not closed within scan bound");
        return None;
    };
    parse_candidate(&text[open..=close])
}

/// The page-level product id used to key special offers.
///
/// This is unrelated to the catalog listing id.
pub fn extract_product_id(text: &str) -> Option<String> {
    PRODUCT_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_owned())
}
