//! Backend selection for generation and embedding providers.
//!
//! Pure construction: given the immutable configuration, build and fully
//! configure (model id, embedding size, defaults) the selected provider.
//! An unrecognized backend name is rejected while parsing the configuration,
//! so by the time these functions run the selector is already a typed enum;
//! the remaining failure mode is a missing credential.

use super::{CohereProvider, EmbeddingClient, GenerationClient, OpenAiProvider};
use crate::config::{Config, ConfigError, LlmBackend};

/// Build the generation provider selected by `GENERATION_BACKEND`.
pub fn generation_client(config: &Config) -> Result<Box<dyn GenerationClient>, ConfigError> {
    let mut provider: Box<dyn GenerationClient> = match config.generation_backend {
        LlmBackend::OpenAi => Box::new(openai_provider(config)?),
        LlmBackend::Cohere => Box::new(cohere_provider(config)?),
    };
    provider.set_generation_model(&config.generation_model_id);
    tracing::debug!(
        backend = ?config.generation_backend,
        model = %config.generation_model_id,
        "Generation provider configured"
    );
    Ok(provider)
}

/// Build the embedding provider selected by `EMBEDDING_BACKEND`.
pub fn embedding_client(config: &Config) -> Result<Box<dyn EmbeddingClient>, ConfigError> {
    let mut provider: Box<dyn EmbeddingClient> = match config.embedding_backend {
        LlmBackend::OpenAi => Box::new(openai_provider(config)?),
        LlmBackend::Cohere => Box::new(cohere_provider(config)?),
    };
    provider.set_embedding_model(&config.embedding_model_id, config.embedding_size);
    tracing::debug!(
        backend = ?config.embedding_backend,
        model = %config.embedding_model_id,
        embedding_size = config.embedding_size,
        "Embedding provider configured"
    );
    Ok(provider)
}

fn openai_provider(config: &Config) -> Result<OpenAiProvider, ConfigError> {
    let api_key = config
        .openai_api_key
        .clone()
        .ok_or_else(|| ConfigError::MissingVariable("OPENAI_API_KEY".to_string()))?;
    Ok(OpenAiProvider::new(
        api_key,
        config.openai_api_url.clone(),
        config.input_default_max_characters,
        config.generation_default_max_tokens,
        config.generation_default_temperature,
    ))
}

fn cohere_provider(config: &Config) -> Result<CohereProvider, ConfigError> {
    let api_key = config
        .cohere_api_key
        .clone()
        .ok_or_else(|| ConfigError::MissingVariable("COHERE_API_KEY".to_string()))?;
    Ok(CohereProvider::new(
        api_key,
        config.cohere_api_url.clone(),
        config.input_default_max_characters,
        config.generation_default_max_tokens,
        config.generation_default_temperature,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistanceMethod, VectorBackend};

    fn base_config() -> Config {
        Config {
            server_port: None,
            generation_backend: LlmBackend::OpenAi,
            embedding_backend: LlmBackend::Cohere,
            openai_api_key: Some("sk-test".into()),
            openai_api_url: None,
            cohere_api_key: Some("co-test".into()),
            cohere_api_url: None,
            generation_model_id: "gpt-test".into(),
            embedding_model_id: "embed-test".into(),
            embedding_size: 4,
            input_default_max_characters: 1024,
            generation_default_max_tokens: 1000,
            generation_default_temperature: 0.1,
            vector_backend: VectorBackend::Qdrant,
            qdrant_url: None,
            qdrant_api_key: None,
            postgres_url: None,
            distance_method: DistanceMethod::Cosine,
            index_threshold: 100,
            chunk_size: None,
            chunk_overlap: 0,
            default_search_limit: 10,
            file_allowed_types: vec!["text/plain".into()],
            file_max_size_mb: 10,
        }
    }

    #[test]
    fn factories_configure_selected_backends() {
        let config = base_config();
        let embedder = embedding_client(&config).expect("embedding provider");
        assert_eq!(embedder.embedding_size(), 4);
        assert!(generation_client(&config).is_ok());
    }

    #[test]
    fn missing_credential_is_a_configuration_error() {
        let mut config = base_config();
        config.cohere_api_key = None;
        let error = embedding_client(&config).err().unwrap();
        assert!(matches!(error, ConfigError::MissingVariable(name) if name == "COHERE_API_KEY"));
    }
}
