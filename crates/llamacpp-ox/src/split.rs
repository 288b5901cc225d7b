//! Separating model reasoning from the final answer.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::response::ResponseMessage;

/// First `<think>...</think>` block, case-insensitive, spanning lines.
static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>(.*?)</think>").expect("think block pattern is valid")
});

/// A leading `final:` / `answer:` label.
static ANSWER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(final|answer)\s*:\s*").expect("answer label pattern is valid")
});

const FENCE: &str = "```";

/// Reasoning and answer text recovered from one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingSplit {
    pub thinking: String,
    pub answer: String,
}

/// Strip conventional wrappers from an answer: surrounding whitespace, one
/// leading `final:`/`answer:` label, and a code fence enclosing the whole text.
///
/// Only the fence backticks are removed; a language tag after the opening
/// fence stays in place.
pub fn clean_answer(text: &str) -> String {
    let trimmed = text.trim();
    let unlabeled = ANSWER_LABEL.replace(trimmed, "");

    if unlabeled.starts_with(FENCE) && unlabeled.ends_with(FENCE) {
        unlabeled.trim_matches('`').trim().to_string()
    } else {
        unlabeled.trim().to_string()
    }
}

/// Pull an inline `<think>` block out of free text.
///
/// The first block supplies the thinking; every block is removed from the answer.
pub fn split_inline(content: &str) -> ThinkingSplit {
    if content.is_empty() {
        return ThinkingSplit::default();
    }

    match THINK_BLOCK.captures(content) {
        Some(caps) => {
            let thinking = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let remainder = THINK_BLOCK.replace_all(content, "");
            ThinkingSplit {
                thinking,
                answer: clean_answer(&remainder),
            }
        }
        None => ThinkingSplit {
            thinking: String::new(),
            answer: clean_answer(content),
        },
    }
}

/// Split a response message into thinking and answer.
///
/// A non-blank dedicated reasoning field wins outright and the content is
/// only de-scaffolded; inline markers are parsed only when no such field exists.
pub fn split_message(message: &ResponseMessage) -> ThinkingSplit {
    if let Some(reasoning) = message
        .reasoning_fragment()
        .filter(|r| !r.trim().is_empty())
    {
        return ThinkingSplit {
            thinking: reasoning.trim().to_string(),
            answer: clean_answer(&message.content_text()),
        };
    }

    match &message.content {
        Some(Value::String(content)) => split_inline(content),
        None | Some(Value::Null) => ThinkingSplit::default(),
        Some(_) => ThinkingSplit {
            thinking: String::new(),
            answer: clean_answer(&message.content_text()),
        },
    }
}
