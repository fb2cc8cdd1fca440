use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::Prompt,
    providers::openrouter,
};
use serde_json::{Value, json};
use tracing::info;
use triage_flow::{ImageAttachment, InferenceService, ServiceError};

const CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const PREAMBLE: &str = "You are a careful medical triage assistant. Follow the requested output format exactly.";
const VISION_MAX_TOKENS: u32 = 1500;

/// Text generation through a rig OpenRouter agent, vision through a raw chat-completions call
pub struct OpenRouterInference {
    http: reqwest::Client,
    api_key: String,
    text_model: String,
    vision_model: String,
}

impl OpenRouterInference {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        text_model: String,
        vision_model: String,
    ) -> Self {
        Self {
            http,
            api_key,
            text_model,
            vision_model,
        }
    }

    fn agent(&self) -> Agent<openrouter::CompletionModel> {
        let client = openrouter::Client::new(&self.api_key);
        client.agent(&self.text_model).preamble(PREAMBLE).build()
    }

    async fn chat_completion(
        &self,
        model: &str,
        content: Vec<Value>,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let payload = json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": content
                }
            ],
            "max_tokens": max_tokens
        });

        let response = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        let response_json: Value = response.json().await?;
        message_content(&response_json)
    }
}

#[async_trait]
impl InferenceService for OpenRouterInference {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let agent = self.agent();
        let response = agent
            .prompt(prompt.to_string())
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        info!(model = %self.text_model, chars = response.len(), "Text completion received");
        Ok(response)
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImageAttachment,
    ) -> Result<String, ServiceError> {
        let content = vec![
            json!({
                "type": "text",
                "text": prompt
            }),
            json!({
                "type": "image_url",
                "image_url": {
                    "url": data_url(image)
                }
            }),
        ];

        let response = self
            .chat_completion(&self.vision_model, content, VISION_MAX_TOKENS)
            .await?;
        info!(model = %self.vision_model, chars = response.len(), "Vision completion received");
        Ok(response)
    }
}

fn data_url(image: &ImageAttachment) -> String {
    format!(
        "data:{};base64,{}",
        image.media_type,
        STANDARD.encode(&image.data)
    )
}

fn message_content(response: &Value) -> anyhow::Result<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid response format from LLM"))
}
