use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;

use super::{
    build_http_client,
    http_stream_generate,
    parse_sse_line,
    to_wire_messages,
    ChatClient,
    FragmentStream,
    WireMessage,
};
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::chat::Message;

pub const DEFAULT_MISTRAL_URL: &str = "https://api.mistral.ai/v1/chat/completions";
pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-small-latest";

/// Chat client for the Mistral La Plateforme API.
pub struct MistralChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    temperature: f32,
}

#[derive(Serialize)]
struct MistralChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
    safe_prompt: bool,
}

impl MistralChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        temperature: f32,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::Config(format!("Invalid API key format: {}", e)))?
        );

        Ok(Self {
            http: build_http_client(headers)?,
            model: model.unwrap_or_else(|| DEFAULT_MISTRAL_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_MISTRAL_URL.to_string()),
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Mistral {
            return Err(LlmError::Config("Invalid config type for MistralChatClient".into()));
        }
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::Config("MISTRAL_API_KEY is not set".to_string()))?;

        Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.temperature,
        )
    }
}

#[async_trait]
impl ChatClient for MistralChatClient {
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, LlmError> {
        let req = MistralChatRequest {
            model: self.model.clone(),
            messages: to_wire_messages(messages),
            temperature: self.temperature,
            stream: true,
            safe_prompt: false,
        };
        debug!("Mistral stream request: model={}, messages={}", self.model, req.messages.len());

        Ok(http_stream_generate(self.http.clone(), self.base_url.clone(), req, parse_sse_line))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::Mistral
    }
}
