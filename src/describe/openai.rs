/// OpenAI-compatible description provider
///
/// Calls any OpenAI-compatible Chat Completions API. The base_url is
/// configurable, so any compatible endpoint works. Requires an API key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{build_category_prompt, build_description_prompt, DescribeError, DescriptionProvider};

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAIDescriptionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAIDescriptionProvider {
    /// # Errors
    /// Returns `DescribeError::NotConfigured` if api_key is empty.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, DescribeError> {
        if api_key.trim().is_empty() {
            return Err(DescribeError::NotConfigured(
                "API key is required when using the openai description provider. \
                 Set AFFSEARCH_DESCRIPTION__API_KEY or description.api_key in affiliate-search.toml"
                    .to_string(),
            ));
        }

        Ok(OpenAIDescriptionProvider {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    /// POST to {base_url}/chat/completions and return the first choice's text.
    async fn chat(&self, prompt: String) -> Result<String, DescribeError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| DescribeError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DescribeError::Api { status, message: body });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            DescribeError::Generation(format!("Failed to parse chat response: {}", e))
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DescribeError::Generation("API returned empty choices list".to_string()))
    }
}

#[async_trait]
impl DescriptionProvider for OpenAIDescriptionProvider {
    async fn describe(&self, product_name: &str, category: &str) -> Result<String, DescribeError> {
        self.chat(build_description_prompt(product_name, category)).await
    }

    async fn suggest_category(&self, product_name: &str) -> Result<String, DescribeError> {
        let text = self.chat(build_category_prompt(product_name)).await?;
        Ok(text.trim().trim_matches('"').to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-test",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn test_new_requires_key() {
        let err = OpenAIDescriptionProvider::new("http://x".into(), " ".into(), "m".into());
        assert!(matches!(err, Err(DescribeError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_describe_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Crisp sound, all day.")))
            .mount(&server)
            .await;

        let provider =
            OpenAIDescriptionProvider::new(server.uri(), "test-key".into(), "gpt-4o-mini".into()).unwrap();
        let text = provider.describe("TWS Earbuds", "Audio").await.unwrap();
        assert_eq!(text, "Crisp sound, all day.");
    }

    #[tokio::test]
    async fn test_suggest_category_strips_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(" \"Electronics\"\n")))
            .mount(&server)
            .await;

        let provider = OpenAIDescriptionProvider::new(server.uri(), "k".into(), "m".into()).unwrap();
        assert_eq!(provider.suggest_category("Earbuds").await.unwrap(), "Electronics");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let provider = OpenAIDescriptionProvider::new(server.uri(), "k".into(), "m".into()).unwrap();
        let err = provider.describe("a", "b").await.unwrap_err();
        assert!(matches!(err, DescribeError::Api { status: 429, .. }));
    }
}
