use crate::config::env;
use pagesift_core::{Error, ModelBackend, ModelRequest, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url =
            env("PAGESIFT_OLLAMA_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
        if url::Url::parse(&base_url).is_err() {
            return Err(Error::NotConfigured(format!(
                "PAGESIFT_OLLAMA_BASE_URL is not a valid URL: {base_url:?}"
            )));
        }
        let model = env("PAGESIFT_OLLAMA_MODEL").unwrap_or_else(|| "llama3".to_string());
        Ok(Self::new(client, base_url, model))
    }

    fn endpoint_chat(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, system: &str, user: &str, max_tokens: Option<u64>) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: Some(false),
            options: max_tokens.map(|n| ChatOptions { num_predict: n }),
        };

        let resp = self
            .client
            .post(self.endpoint_chat())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Extraction(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Extraction(format!("ollama chat HTTP {status}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Extraction(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

#[async_trait::async_trait]
impl ModelBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, req: &ModelRequest) -> Result<String> {
        self.chat(&req.system, &req.user, req.max_tokens).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatOptions {
    num_predict: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}
