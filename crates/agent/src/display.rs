//! Turning raw assistant text into what a person should see.
//!
//! Action blocks are machine traffic and never shown. Reasoning emitted by
//! thinking models (`<think>…</think>`) is split out so a frontend can fold it.

use std::sync::LazyLock;

use crate::parser::{BLOCK_CLOSE, BLOCK_OPEN, find_marker, has_unclosed_block, peek_action_name};

static REASONING: LazyLock<Option<regex_lite::Regex>> = LazyLock::new(|| {
    regex_lite::Regex::new(r"(?is)<think(?:ing)?>(.*?)(?:</think(?:ing)?>|$)").ok()
});

static REASONING_CLOSE: LazyLock<Option<regex_lite::Regex>> =
    LazyLock::new(|| regex_lite::Regex::new(r"(?i)</think(?:ing)?>").ok());

/// Displayable parts of an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedTurn {
    /// Text inside the reasoning tags, if any
    pub reasoning: Option<String>,

    /// The reasoning tag is still open
    pub thinking: bool,

    /// Everything else, with action blocks removed
    pub body: String,

    /// Name of the action whose block is still streaming
    pub pending_action: Option<String>,
}

pub fn render(text: &str) -> RenderedTurn {
    let streaming_block = has_unclosed_block(text);
    let pending_action = if streaming_block {
        peek_action_name(text)
    } else {
        None
    };

    let mut visible = strip_blocks(text);
    if streaming_block && let Some(open) = find_marker(&visible, BLOCK_OPEN, 0) {
        visible.truncate(open);
    }

    let Some(pattern) = REASONING.as_ref() else {
        return RenderedTurn {
            body: visible.trim().to_string(),
            pending_action,
            ..Default::default()
        };
    };

    let reasoning = pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    let thinking = reasoning.is_some()
        && !REASONING_CLOSE
            .as_ref()
            .is_some_and(|close| close.is_match(text));
    let body = pattern.replace(&visible, "").trim().to_string();

    RenderedTurn {
        reasoning,
        thinking,
        body,
        pending_action,
    }
}

/// Remove every complete action block.
pub fn strip_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(open) = find_marker(text, BLOCK_OPEN, cursor) {
        let Some(close) = find_marker(text, BLOCK_CLOSE, open + BLOCK_OPEN.len()) else {
            break;
        };
        out.push_str(&text[cursor..open]);
        cursor = close + BLOCK_CLOSE.len();
    }
    out.push_str(&text[cursor..]);
    out
}

/// `create_patient` → `Create Patient`.
pub fn action_title(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
