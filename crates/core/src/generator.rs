use crate::error::GenerationError;
use crate::traits::AnswerGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GeneratorConfig {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: Url::parse(endpoint.trim())?,
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        })
    }

    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_ENDPOINT").ok()?;
        if endpoint.trim().is_empty() {
            return None;
        }
        let api_key = std::env::var("LLM_API_KEY").ok();
        Self::new(&endpoint, api_key).ok()
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        [self.text, self.answer]
            .into_iter()
            .flatten()
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

pub struct HttpGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AnswerGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = GenerateRequest {
            prompt,
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_output_tokens,
        };

        let mut request = self
            .client
            .post(self.config.endpoint.clone())
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: self.config.endpoint.to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: GenerateResponse = response.json().await?;
        payload.into_text().ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_unparsable_endpoint() {
        assert!(GeneratorConfig::new("not a url", None).is_err());
    }

    #[test]
    fn blank_api_key_is_dropped() -> Result<(), GenerationError> {
        let config = GeneratorConfig::new(" http://localhost:8080/generate ", Some("  ".to_string()))?;
        assert!(config.api_key.is_none());
        assert_eq!(config.endpoint.path(), "/generate");
        Ok(())
    }

    #[test]
    fn response_prefers_first_non_empty_field() -> Result<(), serde_json::Error> {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"text": "  ", "answer": "Door D-101 is 90 min rated."}"#)?;
        assert_eq!(response.into_text().as_deref(), Some("Door D-101 is 90 min rated."));

        let empty: GenerateResponse = serde_json::from_str("{}")?;
        assert!(empty.into_text().is_none());
        Ok(())
    }
}
