//! Hugging Face inference router, OpenAI-compatible chat completions.

use anyhow::{bail, Result};
use async_trait::async_trait;
use docchat_core::generate::LanguageModel;
use docchat_core::prompt::Prompt;

use super::BackendSettings;
use crate::http;

const MAX_NEW_TOKENS: u32 = 1024;

pub struct HuggingFaceBackend {
    settings: BackendSettings,
    token: String,
    client: reqwest::Client,
}

impl HuggingFaceBackend {
    pub fn new(settings: BackendSettings, token: &str) -> Result<Self> {
        let client = settings.client()?;
        Ok(Self {
            settings,
            token: token.to_string(),
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut messages = Vec::with_capacity(prompt.history.len() + 2);
        messages.push(serde_json::json!({ "role": "system", "content": prompt.system }));
        for m in &prompt.history {
            messages.push(serde_json::json!({ "role": m.role.as_str(), "content": m.content }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt.user }));

        serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "max_tokens": MAX_NEW_TOKENS,
            "stream": false,
        })
    }
}

#[async_trait]
impl LanguageModel for HuggingFaceBackend {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let body = self.request_body(prompt);

        let json = http::send_json("Hugging Face API", self.settings.retry, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.token))
                .json(&body)
        })
        .await?;

        parse_response(&json)
    }
}

fn parse_response(json: &serde_json::Value) -> Result<String> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: missing choices"))?;

    let Some(first) = choices.first() else {
        bail!("Hugging Face returned no choices");
    };

    let content = first
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: missing message content"))?;

    if content.is_empty() {
        bail!("Hugging Face returned an empty response");
    }
    Ok(content.to_string())
}
