//! Lenient views over llama.cpp chat completion bodies.
//!
//! Servers disagree on field names and sometimes on shapes, so nothing here
//! fails on an unexpected layout: missing or mistyped parts read as absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names that may carry a dedicated reasoning channel, in priority order.
const REASONING_FIELDS: [&str; 3] = ["reasoning", "thoughts", "reasoning_content"];

/// A `message` object or a streamed `delta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<Value>,
}

impl ResponseMessage {
    /// Read a message from a JSON value; anything but an object yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Content when it is a non-empty string.
    pub fn content_fragment(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Content coerced to text: strings verbatim, `null` or missing as empty,
    /// anything else as its JSON rendering.
    pub fn content_text(&self) -> String {
        self.content.as_ref().map(value_to_text).unwrap_or_default()
    }

    /// First non-empty string among the reasoning fields.
    pub fn reasoning_fragment(&self) -> Option<&str> {
        REASONING_FIELDS
            .iter()
            .filter_map(|name| self.field(name))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
    }

    fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "reasoning" => self.reasoning.as_ref(),
            "thoughts" => self.thoughts.as_ref(),
            "reasoning_content" => self.reasoning_content.as_ref(),
            _ => None,
        }
    }
}

/// What the first choice of a non-streaming response carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceBody {
    /// Chat-style `message` object.
    Message(ResponseMessage),
    /// Completion-style `text`, coerced to a string.
    Text(String),
}

/// Inspect the first entry of `choices`.
///
/// Returns `None` when `choices` is missing, not an array or empty. A first
/// entry without a `message` object falls back to its `text` field.
pub fn first_choice(body: &Value) -> Option<ChoiceBody> {
    let first = body.get("choices")?.as_array()?.first()?;
    let empty = Map::new();
    let choice = first.as_object().unwrap_or(&empty);

    if let Some(message) = choice.get("message").and_then(ResponseMessage::from_value) {
        return Some(ChoiceBody::Message(message));
    }

    Some(ChoiceBody::Text(
        choice.get("text").map(value_to_text).unwrap_or_default(),
    ))
}

/// One decoded event of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub delta: Option<ResponseMessage>,
    pub message: Option<ResponseMessage>,
}

impl StreamEvent {
    /// Parse one event payload. Anything that is not a JSON object is rejected.
    pub fn parse(data: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(data).ok()?;
        let object = value.as_object()?;

        let choice = object
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(Value::as_object);

        Some(Self {
            delta: choice
                .and_then(|c| c.get("delta"))
                .and_then(ResponseMessage::from_value),
            message: choice
                .and_then(|c| c.get("message"))
                .and_then(ResponseMessage::from_value),
        })
    }
}

pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
