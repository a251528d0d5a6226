//! Cohere generation and embedding provider.

use super::{ChatMessage, ChatRole, EmbedIntent, EmbeddingClient, GenerationClient, LlmError, clip_input};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_API_URL: &str = "https://api.cohere.ai";

/// Provider speaking the Cohere v1 chat and embed wire format.
///
/// Unlike the OpenAI variant, Cohere keeps the new user message separate from
/// the prior turns: the message travels in its own field and the history is
/// passed alongside as structured context.
pub struct CohereProvider {
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

impl CohereProvider {
    /// Construct a provider from its immutable settings bundle.
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
            tracing::error!(error = %error, "Cohere request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl GenerationClient for CohereProvider {
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

        let history: Vec<_> = chat_history
            .iter()
            .map(|message| {
                json!({
                    "role": message.role,
                    "message": message.content,
                })
            })
            .collect();

        let body = json!({
            "model": model,
            "message": clip_input(prompt, self.input_max_characters),
            "chat_history": history,
            "max_tokens": max_tokens.unwrap_or(self.default_max_tokens),
            "temperature": temperature.unwrap_or(self.default_temperature),
        });

        let response = self
            .client
            .post(self.endpoint("v1/chat"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response).await?;

        let payload: ChatResponse = response.json().await?;
        match payload.text {
            Some(text) if !text.is_empty() => Ok(text),
            _ => {
                tracing::error!("Cohere returned an empty chat response");
                Err(LlmError::EmptyResponse)
            }
        }
    }

    fn construct_prompt(&self, text: &str, role: ChatRole) -> ChatMessage {
        let role = match role {
            ChatRole::System => "SYSTEM",
            ChatRole::User => "USER",
            ChatRole::Assistant => "CHATBOT",
        };
        ChatMessage {
            role: role.to_string(),
            content: text.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for CohereProvider {
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
        intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self
            .embedding_model_id
            .as_deref()
            .ok_or(LlmError::MissingModel("embedding"))?;

        let input_type = match intent {
            EmbedIntent::Document => "search_document",
            EmbedIntent::Query => "search_query",
        };
        let input: Vec<String> = texts
            .iter()
            .map(|text| clip_input(text, self.input_max_characters))
            .collect();

        let body = json!({
            "model": model,
            "texts": input,
            "input_type": input_type,
        });

        let response = self
            .client
            .post(self.endpoint("v1/embed"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response).await?;

        let payload: EmbedResponse = response.json().await?;
        if payload.embeddings.len() != texts.len() {
            tracing::error!(
                expected = texts.len(),
                actual = payload.embeddings.len(),
                "Cohere embedding count does not match input batch"
            );
            return Err(LlmError::EmptyResponse);
        }
        Ok(payload.embeddings)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn provider(base_url: String) -> CohereProvider {
        CohereProvider::new("test-key".into(), Some(base_url), 1000, 200, 0.1)
    }

    #[tokio::test]
    async fn generate_text_keeps_history_as_structured_context() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat").json_body_partial(
                    json!({
                        "model": "command-test",
                        "message": "What is RAG?",
                        "chat_history": [
                            { "role": "SYSTEM", "message": "Be helpful." }
                        ]
                    })
                    .to_string(),
                );
                then.status(200)
                    .json_body(json!({ "text": "Retrieval, then generation." }));
            })
            .await;

        let mut provider = provider(server.base_url());
        provider.set_generation_model("command-test");
        let history = vec![provider.construct_prompt("Be helpful.", ChatRole::System)];

        let answer = provider
            .generate_text("What is RAG?", &history, None, None)
            .await
            .expect("generation succeeds");

        mock.assert();
        assert_eq!(answer, "Retrieval, then generation.");
    }

    #[tokio::test]
    async fn embed_text_sends_intent_input_type() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embed").json_body_partial(
                    json!({ "input_type": "search_query" }).to_string(),
                );
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.5, 0.6]] }));
            })
            .await;

        let mut provider = provider(server.base_url());
        provider.set_embedding_model("embed-test", 2);

        let vectors = provider
            .embed_text(&["a cat sitting".into()], EmbedIntent::Query)
            .await
            .expect("embedding succeeds");

        mock.assert();
        assert_eq!(vectors, vec![vec![0.5, 0.6]]);
    }

    #[tokio::test]
    async fn chatbot_role_token_differs_from_openai() {
        let provider = provider("http://127.0.0.1:1".into());
        let message = provider.construct_prompt("hi", ChatRole::Assistant);
        assert_eq!(message.role, "CHATBOT");
    }
}
