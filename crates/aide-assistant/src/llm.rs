//! Streaming client for an Ollama-compatible generation endpoint.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation request to {url} failed: {source}")]
    Request {
        url: String,
        source: Box<ureq::Error>,
    },
    #[error("generation stream read failed: {0}")]
    Stream(#[from] std::io::Error),
}

/// Sampling knobs forwarded to the backend verbatim.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.7, top_p: 0.8, top_k: 20, repeat_penalty: 1.05 }
    }
}

pub struct LlmClient {
    agent: ureq::Agent,
    base: String,
    model: String,
    options: GenerationOptions,
}

impl LlmClient {
    #[must_use]
    pub fn new(base: &str, model: &str, timeout: Duration) -> Self {
        // The connect timeout stays short; reads get a generous window since
        // a busy model can pause mid-stream between tokens.
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout.saturating_mul(60))
            .build();

        Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options: GenerationOptions::default(),
        }
    }

    /// Stream a generation. Each emitted chunk is handed to `on_token` as it
    /// arrives; the full concatenated reply is returned once the backend
    /// reports the terminal marker.
    ///
    /// # Errors
    /// Returns [`LlmError::Request`] when the endpoint is unreachable or
    /// rejects the request, and [`LlmError::Stream`] when the response body
    /// cannot be read.
    pub fn generate(
        &self,
        prompt: &str,
        system: &str,
        mut on_token: impl FnMut(&str),
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base);
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "system": system,
            "stream": true,
            "options": {
                "temperature": self.options.temperature,
                "top_p": self.options.top_p,
                "top_k": self.options.top_k,
                "repeat_penalty": self.options.repeat_penalty,
            },
        });

        let response = self.agent.post(&url).send_json(payload).map_err(|source| {
            LlmError::Request { url: url.clone(), source: Box::new(source) }
        })?;

        // The backend streams one JSON object per line.
        let reader = BufReader::new(response.into_reader());
        let mut full = String::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Value>(&line) else {
                continue;
            };

            if let Some(chunk) = event.get("response").and_then(Value::as_str) {
                if !chunk.is_empty() {
                    full.push_str(chunk);
                    on_token(chunk);
                }
            }

            if event.get("done").and_then(Value::as_bool).unwrap_or(false) {
                break;
            }
        }

        Ok(full.trim().to_string())
    }
}
