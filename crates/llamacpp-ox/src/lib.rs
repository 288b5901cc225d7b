#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

//! llama.cpp server client for Rust
//!
//! Talks to the OpenAI-compatible `/v1/chat/completions` endpoint of a local
//! llama.cpp server and reduces whatever comes back to five strings:
//! - the answer, with `answer:` labels and enclosing code fences removed
//! - the model's thinking, from a dedicated reasoning field or an inline
//!   `<think>` block
//! - a pretty-printed JSON value recovered from the answer in JSON mode
//! - the raw response for diagnostics
//! - the model id that was used
//!
//! Every string passes through the configured [`TextPostprocess`] repair.
//!
//! # Example
//!
//! ```rust,no_run
//! use llamacpp_ox::{CallOptions, LlamaCpp};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LlamaCpp::new();
//!     let options = CallOptions::builder()
//!         .server_url("http://127.0.0.1:8082")
//!         .prompt("Name three primary colors as a JSON array.")
//!         .json_mode(true)
//!         .build();
//!
//!     let output = client.run(&options, None).await?;
//!     println!("{}", output.json);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod image;
mod internal;
pub mod json_extract;
pub mod message;
pub mod models;
pub mod progress;
pub mod request;
pub mod response;
pub mod split;
pub mod stream;
pub mod text;

pub use config::{CallOptions, ModelMode, StopMode};
pub use error::LlamaCppError;
pub use crate::image::{ImageEncoder, ImageTensor, NoImageEncoder, PngImageEncoder};
pub use json_extract::extract_json;
pub use message::{Message, UserMessage};
pub use models::{FALLBACK_MODEL_ID, pick_model_id};
pub use progress::{NoProgress, ProgressReporter};
pub use request::{ChatRequest, ResponseFormat};
pub use response::{ChoiceBody, ResponseMessage, StreamEvent};
pub use split::{ThinkingSplit, clean_answer, split_inline, split_message};
pub use stream::{StreamAccumulator, StreamMeta, StreamOutcome, decode_line_stream, decode_lines};
pub use text::{TextPostprocess, normalize, repair_encoding, straighten_quotes};

use core::fmt;
use std::sync::Arc;

use bon::Builder;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::internal::LlamaCppRequestHelper;

/// The five outputs of one chat call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatOutput {
    pub answer: String,
    pub thinking: String,
    /// Pretty-printed extracted JSON, empty when not requested or not found.
    pub json: String,
    pub raw: String,
    pub model_used: String,
}

impl ChatOutput {
    /// `(answer, thinking, json, raw, model_used)`
    pub fn into_tuple(self) -> (String, String, String, String, String) {
        (self.answer, self.thinking, self.json, self.raw, self.model_used)
    }
}

/// llama.cpp chat client.
///
/// Holds the HTTP client and the injected image and progress capabilities;
/// everything that varies per call lives in [`CallOptions`].
#[derive(Clone, Builder)]
pub struct LlamaCpp {
    #[builder(default)]
    pub(crate) client: reqwest::Client,
    #[builder(default = Arc::new(NoImageEncoder) as Arc<dyn ImageEncoder>)]
    pub(crate) image_encoder: Arc<dyn ImageEncoder>,
    #[builder(default = Arc::new(NoProgress) as Arc<dyn ProgressReporter>)]
    pub(crate) progress: Arc<dyn ProgressReporter>,
}

impl Default for LlamaCpp {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LlamaCpp {
    /// Client without image support or progress reporting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client that uploads images as PNG data URLs.
    pub fn with_png_images() -> Self {
        Self::builder().image_encoder(Arc::new(PngImageEncoder)).build()
    }

    /// Run one chat call.
    ///
    /// An empty prompt returns empty outputs without contacting the server.
    /// Transport failures and non-success statuses are errors; everything
    /// wrong with the response body itself degrades to empty outputs.
    pub async fn run(
        &self,
        options: &CallOptions,
        image: Option<&ImageTensor>,
    ) -> Result<ChatOutput, LlamaCppError> {
        let base_url = options.base_url();
        if base_url.is_empty() {
            return Err(LlamaCppError::InvalidConfig("server_url is empty".to_string()));
        }

        if options.prompt.trim().is_empty() {
            return Ok(ChatOutput::default());
        }

        let helper = LlamaCppRequestHelper::new(
            self.client.clone(),
            base_url,
            Some(&options.api_key),
            options.timeout(),
        );

        let model = Self::resolve_model(&helper, options).await;
        let request = ChatRequest::compose(options, model.clone(), image, self.image_encoder.as_ref())?;

        debug!(
            model = %model,
            messages = request.messages.len(),
            stream = options.stream,
            json_mode = options.json_mode,
            "sending chat request"
        );

        if options.stream {
            self.run_streaming(&helper, &request, options, model).await
        } else {
            Self::run_single(&helper, &request, options, model).await
        }
    }

    async fn resolve_model(helper: &LlamaCppRequestHelper, options: &CallOptions) -> String {
        if let Some(model) = options.model_override() {
            return model.to_string();
        }

        helper.fetch_model_id().await.unwrap_or_else(|| {
            warn!(fallback = FALLBACK_MODEL_ID, "no model id discovered, using fallback");
            FALLBACK_MODEL_ID.to_string()
        })
    }

    async fn run_streaming(
        &self,
        helper: &LlamaCppRequestHelper,
        request: &ChatRequest,
        options: &CallOptions,
        model_used: String,
    ) -> Result<ChatOutput, LlamaCppError> {
        let mode = options.text_postprocess;
        let lines = helper.stream_chat_request(request).await?;
        let outcome = decode_line_stream(lines, self.progress.as_ref()).await?;

        let answer = normalize(&clean_answer(&outcome.content), mode);
        let thinking = normalize(outcome.reasoning.trim(), mode);
        let raw = json!({
            "stream_meta": outcome.meta,
            "content": outcome.content,
            "reasoning": outcome.reasoning,
        });
        let raw = normalize(&raw.to_string(), mode);
        let json = json_payload(&answer, options)?;

        Ok(ChatOutput {
            answer,
            thinking,
            json,
            raw,
            model_used,
        })
    }

    async fn run_single(
        helper: &LlamaCppRequestHelper,
        request: &ChatRequest,
        options: &CallOptions,
        model_used: String,
    ) -> Result<ChatOutput, LlamaCppError> {
        let mode = options.text_postprocess;
        let body = helper.send_chat_request(request).await?;
        let raw = normalize(&serde_json::to_string_pretty(&body)?, mode);

        let split = match response::first_choice(&body) {
            None => {
                return Ok(ChatOutput {
                    raw,
                    model_used,
                    ..ChatOutput::default()
                });
            }
            Some(ChoiceBody::Text(text)) => ThinkingSplit {
                thinking: String::new(),
                answer: clean_answer(&text),
            },
            Some(ChoiceBody::Message(message)) => split_message(&message),
        };

        let answer = normalize(&split.answer, mode);
        let thinking = normalize(&split.thinking, mode);
        let json = json_payload(&answer, options)?;

        Ok(ChatOutput {
            answer,
            thinking,
            json,
            raw,
            model_used,
        })
    }
}

/// Pretty-printed JSON found in the answer, or an empty string.
fn json_payload(answer: &str, options: &CallOptions) -> Result<String, LlamaCppError> {
    if !options.json_mode {
        return Ok(String::new());
    }

    match extract_json(answer) {
        Some(value) => Ok(normalize(
            &serde_json::to_string_pretty(&value)?,
            options.text_postprocess,
        )),
        None => Ok(String::new()),
    }
}

impl fmt::Debug for LlamaCpp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlamaCpp")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
