//! OpenAI-compatible generation and embedding provider.

use super::{ChatMessage, ChatRole, EmbedIntent, EmbeddingClient, GenerationClient, LlmError, clip_input};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1";

/// Provider speaking the OpenAI chat-completions and embeddings wire format.
///
/// Also covers self-hosted OpenAI-compatible gateways via the base URL
/// override.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    input_max_characters: usize,
    default_max_tokens: u32,
    default_temperature: f32,
    generation_model_id: Option<String>,
    embedding_model_id: Option<String>,
    embedding_size: usize,
}

impl OpenAiProvider {
    /// Construct a provider from its immutable settings bundle.
    ///
    /// Model identifiers are set afterwards by the factory; calls made before
    /// that fail with [`LlmError::MissingModel`].
    pub fn new(
        api_key: String,
        api_url: Option<String>,
        input_max_characters: usize,
        default_max_tokens: u32,
        default_temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: api_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            input_max_characters,
            default_max_tokens,
            default_temperature,
            generation_model_id: None,
            embedding_model_id: None,
            embedding_size: 0,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = LlmError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "OpenAI request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl GenerationClient for OpenAiProvider {
    fn set_generation_model(&mut self, model_id: &str) {
        self.generation_model_id = Some(model_id.to_string());
    }

    async fn generate_text(
        &self,
        prompt: &str,
        chat_history: &[ChatMessage],
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<String, LlmError> {
        let model = self
            .generation_model_id
            .as_deref()
            .ok_or(LlmError::MissingModel("generation"))?;

        // OpenAI takes the whole conversation as one message list; the new
        // user turn goes onto a request-local copy of the history.
        let mut messages = chat_history.to_vec();
        messages.push(self.construct_prompt(
            &clip_input(prompt, self.input_max_characters),
            ChatRole::User,
        ));

        let body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens.unwrap_or(self.default_max_tokens),
            "temperature": temperature.unwrap_or(self.default_temperature),
        });

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response).await?;

        let payload: ChatCompletionResponse = response.json().await?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                tracing::error!("OpenAI returned no completion choices");
                LlmError::EmptyResponse
            })?;

        Ok(text)
    }

    fn construct_prompt(&self, text: &str, role: ChatRole) -> ChatMessage {
        let role = match role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        ChatMessage {
            role: role.to_string(),
            content: text.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiProvider {
    fn set_embedding_model(&mut self, model_id: &str, embedding_size: usize) {
        self.embedding_model_id = Some(model_id.to_string());
        self.embedding_size = embedding_size;
    }

    fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    async fn embed_text(
        &self,
        texts: &[String],
        _intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self
            .embedding_model_id
            .as_deref()
            .ok_or(LlmError::MissingModel("embedding"))?;

        let input: Vec<String> = texts
            .iter()
            .map(|text| clip_input(text, self.input_max_characters))
            .collect();

        let body = json!({
            "model": model,
            "input": input,
        });

        let response = self
            .client
            .post(self.endpoint("embeddings"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response).await?;

        let payload: EmbeddingResponse = response.json().await?;
        let mut data = payload.data;
        if data.len() != texts.len() {
            tracing::error!(
                expected = texts.len(),
                actual = data.len(),
                "OpenAI embedding count does not match input batch"
            );
            return Err(LlmError::EmptyResponse);
        }
        // The API documents index-ordered output; sort defensively anyway
        // since record-id alignment depends on it.
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn provider(base_url: String) -> OpenAiProvider {
        OpenAiProvider::new("test-key".into(), Some(base_url), 1000, 200, 0.1)
    }

    #[tokio::test]
    async fn generate_text_appends_user_turn_to_history() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(
                        json!({
                            "model": "gpt-test",
                            "messages": [
                                { "role": "system", "content": "Be helpful." },
                                { "role": "user", "content": "What is RAG?" }
                            ]
                        })
                        .to_string(),
                    );
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "Retrieval, then generation." } }
                    ]
                }));
            })
            .await;

        let mut provider = provider(server.base_url());
        provider.set_generation_model("gpt-test");
        let history = vec![provider.construct_prompt("Be helpful.", ChatRole::System)];

        let answer = provider
            .generate_text("What is RAG?", &history, None, None)
            .await
            .expect("generation succeeds");

        mock.assert();
        assert_eq!(answer, "Retrieval, then generation.");
        // caller-owned history stays untouched
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn generate_text_without_model_fails_fast() {
        let provider = provider("http://127.0.0.1:1".into());
        let error = provider
            .generate_text("hello", &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::MissingModel("generation")));
    }

    #[tokio::test]
    async fn generate_text_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let mut provider = provider(server.base_url());
        provider.set_generation_model("gpt-test");
        let error = provider
            .generate_text("hello", &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn embed_text_returns_vectors_in_input_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.3, 0.4] },
                        { "index": 0, "embedding": [0.1, 0.2] }
                    ]
                }));
            })
            .await;

        let mut provider = provider(server.base_url());
        provider.set_embedding_model("embed-test", 2);

        let vectors = provider
            .embed_text(&["first".into(), "second".into()], EmbedIntent::Document)
            .await
            .expect("embedding succeeds");

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn embed_text_fails_on_count_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "index": 0, "embedding": [0.1] } ]
                }));
            })
            .await;

        let mut provider = provider(server.base_url());
        provider.set_embedding_model("embed-test", 1);

        let error = provider
            .embed_text(&["a".into(), "b".into()], EmbedIntent::Query)
            .await
            .unwrap_err();
        assert!(matches!(error, LlmError::EmptyResponse));
    }
}
