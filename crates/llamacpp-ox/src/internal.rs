use std::time::Duration;

use futures_util::stream::BoxStream;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{LlamaCppError, parse_error_response},
    models::{MODELS_PATH, pick_model_id},
    request::ChatRequest,
    stream::sse_lines,
};

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// HTTP plumbing for one llama.cpp server.
#[derive(Clone)]
pub(crate) struct LlamaCppRequestHelper {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl LlamaCppRequestHelper {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, self.url(path))
            .timeout(self.timeout)
            .header("content-type", "application/json");

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        req
    }

    /// Ask the server which model it serves. Every failure reads as `None`.
    pub async fn fetch_model_id(&self) -> Option<String> {
        let response = match self.request(reqwest::Method::GET, MODELS_PATH).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "model discovery request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "model discovery returned an error status");
            return None;
        }

        match response.json::<Value>().await {
            Ok(payload) => {
                let model = pick_model_id(&payload);
                debug!(model = ?model, "model discovery finished");
                model
            }
            Err(e) => {
                warn!(error = %e, "model discovery body was not JSON");
                None
            }
        }
    }

    /// Send a non-streaming chat request and return the decoded JSON body.
    pub async fn send_chat_request(&self, request: &ChatRequest) -> Result<Value, LlamaCppError> {
        let response = self
            .request(reqwest::Method::POST, CHAT_COMPLETIONS_PATH)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Err(parse_error_response(status, &bytes))
        }
    }

    /// Send a streaming chat request and return its body as text lines.
    ///
    /// Status errors surface before any line is produced.
    pub async fn stream_chat_request(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<String, LlamaCppError>>, LlamaCppError> {
        let mut request = request.clone();
        request.stream = Some(true);

        let response = self
            .request(reqwest::Method::POST, CHAT_COMPLETIONS_PATH)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await?;
            return Err(parse_error_response(status, &bytes));
        }

        Ok(sse_lines(response.bytes_stream()))
    }
}
