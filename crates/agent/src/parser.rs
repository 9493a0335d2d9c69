//! Action block recognition.
//!
//! Wire format: `<tool_block> ... <params>{json}</params> ... </tool_block>`.
//! Markers are matched ASCII-case-insensitively. [`parse_blocks`] works on a
//! finished buffer; [`BlockScanner`] follows a buffer as it grows and only
//! looks at the bytes appended since the last call.

use clinicdesk_core::action::{Params, ParsedBlock, new_block_id};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

pub const BLOCK_OPEN: &str = "<tool_block>";
pub const BLOCK_CLOSE: &str = "</tool_block>";
pub const PARAMS_OPEN: &str = "<params>";
pub const PARAMS_CLOSE: &str = "</params>";

/// Fallback name for a block whose payload names no action.
pub const UNKNOWN_ACTION: &str = "unknown";

static ACTION_NAME: LazyLock<Option<regex_lite::Regex>> =
    LazyLock::new(|| regex_lite::Regex::new(r#""(?:action|tool)"\s*:\s*"([^"]+)""#).ok());

/// Position of `needle` in `haystack` at or after `from`, ignoring ASCII case.
pub(crate) fn find_marker(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if from >= hay.len() || needle.len() > hay.len() - from {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|p| p + from)
}

/// Where the scanner is relative to the block markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    OutsideBlock,
    InBlock,
    InParams,
}

/// Incremental marker scanner over a growing text buffer.
///
/// Each [`push`](Self::push) scans only the new bytes plus a marker-length
/// overlap, so a marker split across deltas is still found.
#[derive(Debug, Default)]
pub struct BlockScanner {
    buffer: String,
    cursor: usize,
    state: ScanState,
    open_at: Option<usize>,
    first_close_end: Option<usize>,
}

impl BlockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and advance the state machine.
    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
        self.advance();
    }

    fn advance(&mut self) {
        loop {
            match self.state {
                ScanState::OutsideBlock => {
                    let Some(at) = find_marker(&self.buffer, BLOCK_OPEN, self.cursor) else {
                        self.park(BLOCK_OPEN.len());
                        return;
                    };
                    self.state = ScanState::InBlock;
                    self.open_at = Some(at);
                    self.cursor = at + BLOCK_OPEN.len();
                }
                ScanState::InBlock | ScanState::InParams => {
                    let inner = if self.state == ScanState::InBlock {
                        PARAMS_OPEN
                    } else {
                        PARAMS_CLOSE
                    };
                    let close = find_marker(&self.buffer, BLOCK_CLOSE, self.cursor);
                    let next_inner = find_marker(&self.buffer, inner, self.cursor);
                    match (next_inner, close) {
                        (Some(i), c) if c.is_none_or(|c| i < c) => {
                            self.state = if self.state == ScanState::InBlock {
                                ScanState::InParams
                            } else {
                                ScanState::InBlock
                            };
                            self.cursor = i + inner.len();
                        }
                        (_, Some(c)) => {
                            let end = c + BLOCK_CLOSE.len();
                            self.state = ScanState::OutsideBlock;
                            self.open_at = None;
                            self.first_close_end.get_or_insert(end);
                            self.cursor = end;
                        }
                        _ => {
                            self.park(BLOCK_CLOSE.len().max(inner.len()));
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Nothing more to find: resume next time just before the tail that
    /// could still be the start of a marker.
    fn park(&mut self, marker_len: usize) {
        self.cursor = self
            .cursor
            .max(self.buffer.len().saturating_sub(marker_len - 1));
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// An opening marker has been seen and its closing marker has not.
    pub fn has_unclosed_block(&self) -> bool {
        self.state != ScanState::OutsideBlock
    }

    /// Byte offset just past the first closing marker, once one has arrived.
    pub fn first_close_end(&self) -> Option<usize> {
        self.first_close_end
    }

    /// Best-effort action name from the block still being streamed.
    pub fn pending_action_name(&self) -> Option<&str> {
        let open = self.open_at?;
        ACTION_NAME
            .as_ref()?
            .captures(&self.buffer[open..])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn into_text(self) -> String {
        self.buffer
    }
}

/// True when `text` holds an opening marker not yet matched by a closing one.
pub fn has_unclosed_block(text: &str) -> bool {
    let mut scanner = BlockScanner::new();
    scanner.push(text);
    scanner.has_unclosed_block()
}

/// Best-effort action name from an unterminated block at the end of `text`.
pub fn peek_action_name(text: &str) -> Option<String> {
    let mut scanner = BlockScanner::new();
    scanner.push(text);
    scanner.pending_action_name().map(str::to_string)
}

/// Every well-formed block in `text`, left to right.
///
/// A block pairs an opening marker with the first closing marker after it.
/// Blocks without a params section, or whose payload is not a JSON object,
/// are skipped.
pub fn parse_blocks(text: &str) -> Vec<ParsedBlock> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(open) = find_marker(text, BLOCK_OPEN, pos) {
        let body_start = open + BLOCK_OPEN.len();
        let Some(close) = find_marker(text, BLOCK_CLOSE, body_start) else {
            break;
        };
        let end = close + BLOCK_CLOSE.len();
        pos = end;

        let body = &text[body_start..close];
        let Some(payload) = params_payload(body) else {
            continue;
        };
        match serde_json::from_str::<Value>(payload.trim()) {
            Ok(Value::Object(parameters)) => blocks.push(ParsedBlock {
                id: new_block_id(),
                action_name: action_name(&parameters),
                parameters,
                raw_text: text[open..end].to_string(),
            }),
            Ok(other) => {
                warn!(kind = json_kind(&other), "Skipping action block: payload is not an object");
            }
            Err(e) => {
                warn!(error = %e, "Skipping action block with malformed params");
            }
        }
    }

    blocks
}

fn params_payload(body: &str) -> Option<&str> {
    let start = find_marker(body, PARAMS_OPEN, 0)? + PARAMS_OPEN.len();
    let end = find_marker(body, PARAMS_CLOSE, start)?;
    Some(&body[start..end])
}

fn action_name(parameters: &Params) -> String {
    ["action", "tool"]
        .iter()
        .find_map(|key| parameters.get(*key).and_then(Value::as_str))
        .unwrap_or(UNKNOWN_ACTION)
        .to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
