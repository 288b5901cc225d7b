use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    config::CallOptions,
    error::LlamaCppError,
    image::{ImageEncoder, ImageTensor},
    message::{Message, Messages, UserMessage},
};

/// Instruction appended to the system prompt in JSON mode.
pub const JSON_INSTRUCTION: &str =
    "Return ONLY valid JSON. No commentary, no markdown, no code fences.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonObject,
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Builder)]
#[builder(builder_type(vis = "pub"), state_mod(vis = "pub"))]
pub struct ChatRequest {
    pub messages: Messages,
    #[builder(into)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Build the request for one call.
    ///
    /// The system prompt gains the JSON instruction (and shape hint) in JSON
    /// mode. When an image is given the user message becomes a content list,
    /// with an image part only if the encoder produced a URL.
    pub fn compose(
        options: &CallOptions,
        model: impl Into<String>,
        image: Option<&ImageTensor>,
        encoder: &dyn ImageEncoder,
    ) -> Result<Self, LlamaCppError> {
        let user_text = options.prompt.trim();

        let user = match image {
            Some(image) => UserMessage::with_image(user_text, encoder.encode(image)?),
            None => UserMessage::new(user_text),
        };

        let mut messages: Messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt(options) {
            messages.push(Message::system(system));
        }
        messages.push(user.into());

        Ok(ChatRequest::builder()
            .messages(messages)
            .model(model)
            .maybe_max_tokens(options.max_tokens())
            .maybe_seed(options.seed())
            .maybe_stop(options.stop_sequence())
            .maybe_response_format(options.json_mode.then_some(ResponseFormat::JsonObject))
            .maybe_stream(options.stream.then_some(true))
            .build())
    }
}

fn system_prompt(options: &CallOptions) -> Option<String> {
    let system = options.system_prompt.trim();

    if !options.json_mode {
        return (!system.is_empty()).then(|| system.to_string());
    }

    let hint = options.json_schema_hint.trim();
    let instruction = if hint.is_empty() {
        JSON_INSTRUCTION.to_string()
    } else {
        format!("{JSON_INSTRUCTION}\nJSON schema / shape hint:\n{hint}")
    };

    if system.is_empty() {
        Some(instruction)
    } else {
        Some(format!("{system}\n\n{instruction}"))
    }
}
