//! Google Gemini `generateContent` backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use docchat_core::generate::LanguageModel;
use docchat_core::models::Role;
use docchat_core::prompt::Prompt;

use super::BackendSettings;
use crate::http;

pub struct GeminiBackend {
    settings: BackendSettings,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(settings: BackendSettings, api_key: &str) -> Result<Self> {
        let client = settings.client()?;
        Ok(Self {
            settings,
            api_key: api_key.to_string(),
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = prompt
            .history
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();
        contents.push(serde_json::json!({ "role": "user", "parts": [{ "text": prompt.user }] }));

        serde_json::json!({
            "systemInstruction": { "parts": [{ "text": prompt.system }] },
            "contents": contents,
            "generationConfig": { "temperature": self.settings.temperature },
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiBackend {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url, self.settings.model
        );
        let body = self.request_body(prompt);

        let json = http::send_json("Gemini API", self.settings.retry, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        parse_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_response(json: &serde_json::Value) -> Result<String> {
    let candidates = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .filter(|c| !c.is_empty());

    let Some(candidates) = candidates else {
        if let Some(reason) = json.pointer("/promptFeedback/blockReason").and_then(|r| r.as_str())
        {
            bail!("Gemini blocked the prompt: {}", reason);
        }
        bail!("Gemini returned no candidates");
    };

    let parts = candidates[0]
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidates[0]
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            anyhow::anyhow!("Gemini candidate has no content (finish reason: {})", reason)
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Gemini returned an empty response");
    }
    Ok(text)
}
