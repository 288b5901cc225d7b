//! Per-call options, one field per input of the chat node.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::text::TextPostprocess;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8082";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;
pub const MAX_TOKENS_LIMIT: u32 = 131_072;

pub const SERVER_URL_ENV: &str = "LLAMACPP_SERVER_URL";
pub const API_KEY_ENV: &str = "LLAMACPP_API_KEY";

/// How the model id is chosen.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(from = "String", into = "&'static str")]
pub enum ModelMode {
    /// Ask the server for its first model.
    #[default]
    #[strum(serialize = "auto")]
    Auto,
    /// Use `model_override` when it is non-empty.
    #[strum(serialize = "custom")]
    Custom,
}

impl From<String> for ModelMode {
    fn from(value: String) -> Self {
        value.trim().parse().unwrap_or_default()
    }
}

/// Which stop sequence is sent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(from = "String", into = "&'static str")]
pub enum StopMode {
    #[default]
    #[strum(serialize = "none")]
    None,
    /// `<|eot_id|>`, the end-of-turn token of many chat templates.
    #[strum(serialize = "preset:common_eot")]
    CommonEot,
    /// `###`
    #[strum(serialize = "preset:triple_hash")]
    TripleHash,
    /// The trimmed `stop_custom` text.
    #[strum(serialize = "custom")]
    Custom,
}

impl From<String> for StopMode {
    fn from(value: String) -> Self {
        value.trim().parse().unwrap_or_default()
    }
}

/// Everything a single chat call needs besides the optional image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(builder_type(vis = "pub"), state_mod(vis = "pub"))]
#[serde(default)]
pub struct CallOptions {
    #[builder(default = DEFAULT_SERVER_URL.to_string(), into)]
    pub server_url: String,
    #[builder(default, into)]
    pub prompt: String,
    #[builder(default, into)]
    pub system_prompt: String,
    #[builder(default, into)]
    pub api_key: String,
    #[builder(default)]
    pub model_mode: ModelMode,
    #[builder(default, into)]
    pub model_override: String,
    #[builder(default = true)]
    pub stream: bool,
    #[builder(default = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout_seconds: u64,
    #[builder(default)]
    pub json_mode: bool,
    #[builder(default, into)]
    pub json_schema_hint: String,
    /// `0` leaves the limit to the server.
    #[builder(default)]
    pub max_tokens: u32,
    /// Negative values leave seeding to the server.
    #[builder(default = -1)]
    pub seed: i64,
    #[builder(default)]
    pub stop_mode: StopMode,
    #[builder(default, into)]
    pub stop_custom: String,
    #[builder(default)]
    pub text_postprocess: TextPostprocess,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CallOptions {
    /// Defaults, with the server URL and API key read from
    /// `LLAMACPP_SERVER_URL` / `LLAMACPP_API_KEY` when set.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(server_url) = std::env::var(SERVER_URL_ENV) {
            options.server_url = server_url;
        }
        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            options.api_key = api_key;
        }
        options
    }

    /// Server URL without surrounding whitespace or trailing slashes.
    pub fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }

    /// Request timeout; `0` means the default of 300 seconds.
    pub fn timeout(&self) -> std::time::Duration {
        let seconds = match self.timeout_seconds {
            0 => DEFAULT_TIMEOUT_SECONDS,
            seconds => seconds.min(MAX_TIMEOUT_SECONDS),
        };
        std::time::Duration::from_secs(seconds)
    }

    /// The stop sequence to send, if any.
    pub fn stop_sequence(&self) -> Option<String> {
        let stop = match self.stop_mode {
            StopMode::None => return None,
            StopMode::CommonEot => "<|eot_id|>",
            StopMode::TripleHash => "###",
            StopMode::Custom => self.stop_custom.trim(),
        };
        (!stop.is_empty()).then(|| stop.to_string())
    }

    pub fn max_tokens(&self) -> Option<u32> {
        (self.max_tokens > 0).then(|| self.max_tokens.min(MAX_TOKENS_LIMIT))
    }

    pub fn seed(&self) -> Option<u64> {
        u64::try_from(self.seed).ok()
    }

    /// Override id when custom model selection is in effect.
    pub fn model_override(&self) -> Option<&str> {
        match self.model_mode {
            ModelMode::Custom => Some(self.model_override.trim()).filter(|m| !m.is_empty()),
            ModelMode::Auto => None,
        }
    }
}
