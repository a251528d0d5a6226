use std::env;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Backend selector named a provider this build does not know about.
    #[error("Unknown backend name: {0}")]
    UnknownBackend(String),
}

/// Runtime configuration for the RAG server.
///
/// Built once in `main` via [`Config::from_env`] and passed explicitly into
/// every component constructor; core logic never reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Backend used for text generation.
    pub generation_backend: LlmBackend,
    /// Backend used for embeddings.
    pub embedding_backend: LlmBackend,
    /// API key for the OpenAI-compatible backend.
    pub openai_api_key: Option<String>,
    /// Base URL override for the OpenAI-compatible backend.
    pub openai_api_url: Option<String>,
    /// API key for the Cohere backend.
    pub cohere_api_key: Option<String>,
    /// Base URL override for the Cohere backend.
    pub cohere_api_url: Option<String>,
    /// Model identifier used for generation requests.
    pub generation_model_id: String,
    /// Model identifier used for embedding requests.
    pub embedding_model_id: String,
    /// Dimensionality of the produced vectors.
    pub embedding_size: usize,
    /// Maximum number of characters submitted per input item.
    pub input_default_max_characters: usize,
    /// Default token budget for generation when the caller passes none.
    pub generation_default_max_tokens: u32,
    /// Default sampling temperature when the caller passes none.
    pub generation_default_temperature: f32,
    /// Vector database backend selector.
    pub vector_backend: VectorBackend,
    /// Base URL of the Qdrant instance.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Connection string for the pgvector-enabled Postgres instance.
    pub postgres_url: Option<String>,
    /// Similarity metric used to rank vectors.
    pub distance_method: DistanceMethod,
    /// Record count at which the pgvector store creates an ANN index.
    pub index_threshold: usize,
    /// Optional override for the automatic chunk size selection.
    pub chunk_size: Option<usize>,
    /// Sliding token overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Result count applied when a search request omits `limit`.
    pub default_search_limit: usize,
    /// MIME types accepted by the upload collaborator.
    pub file_allowed_types: Vec<String>,
    /// Maximum upload size in megabytes.
    pub file_max_size_mb: usize,
}

/// Supported hosted LLM backends for generation and embeddings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmBackend {
    /// OpenAI-compatible chat/embeddings API.
    OpenAi,
    /// Cohere chat/embed API.
    Cohere,
}

/// Supported vector database backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    /// Qdrant over its REST interface.
    Qdrant,
    /// Postgres with the pgvector extension.
    PgVector,
}

/// Similarity metric used to rank vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceMethod {
    /// Cosine distance.
    Cosine,
    /// Dot-product distance.
    Dot,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_optional("SERVER_PORT")?,
            generation_backend: load_env("GENERATION_BACKEND")?
                .parse()
                .map_err(ConfigError::UnknownBackend)?,
            embedding_backend: load_env("EMBEDDING_BACKEND")?
                .parse()
                .map_err(ConfigError::UnknownBackend)?,
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_api_url: load_env_optional("OPENAI_API_URL"),
            cohere_api_key: load_env_optional("COHERE_API_KEY"),
            cohere_api_url: load_env_optional("COHERE_API_URL"),
            generation_model_id: load_env("GENERATION_MODEL_ID")?,
            embedding_model_id: load_env("EMBEDDING_MODEL_ID")?,
            embedding_size: load_env("EMBEDDING_SIZE")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_SIZE".to_string()))?,
            input_default_max_characters: parse_optional("INPUT_DEFAULT_MAX_CHARACTERS")?
                .unwrap_or(1024),
            generation_default_max_tokens: parse_optional("GENERATION_DEFAULT_MAX_TOKENS")?
                .unwrap_or(1000),
            generation_default_temperature: parse_optional("GENERATION_DEFAULT_TEMPERATURE")?
                .unwrap_or(0.1),
            vector_backend: load_env("VECTORDB_BACKEND")?
                .parse()
                .map_err(ConfigError::UnknownBackend)?,
            qdrant_url: load_env_optional("QDRANT_URL"),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            postgres_url: load_env_optional("POSTGRES_URL"),
            distance_method: match load_env_optional("DISTANCE_METHOD") {
                Some(value) => value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("DISTANCE_METHOD".to_string()))?,
                None => DistanceMethod::Cosine,
            },
            index_threshold: parse_optional("INDEX_THRESHOLD")?.unwrap_or(100),
            chunk_size: parse_optional("CHUNK_SIZE")?,
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?.unwrap_or(0),
            default_search_limit: parse_optional("DEFAULT_SEARCH_LIMIT")?.unwrap_or(10),
            file_allowed_types: load_env_optional("FILE_ALLOWED_TYPES")
                .map(|value| {
                    value
                        .split(',')
                        .map(|item| item.trim().to_string())
                        .filter(|item| !item.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["text/plain".to_string(), "application/pdf".to_string()]),
            file_max_size_mb: parse_optional("FILE_MAX_SIZE_MB")?.unwrap_or(10),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPENAI" => Ok(Self::OpenAi),
            "COHERE" => Ok(Self::Cohere),
            other => Err(other.to_string()),
        }
    }
}

impl std::str::FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QDRANT" => Ok(Self::Qdrant),
            "PGVECTOR" => Ok(Self::PgVector),
            other => Err(other.to_string()),
        }
    }
}

impl std::str::FromStr for DistanceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            other => Err(other.to_string()),
        }
    }
}
