use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub execution: ExecutionConfig,
    pub patterns: PatternConfig,
    pub background: BackgroundConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
    pub default_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternConfig {
    pub enabled: bool,
    pub backend: String,
    pub qdrant_url: Option<String>,
    pub collection: String,
    pub min_similarity: f32,
    pub top_k: usize,
    pub embedding_timeout_secs: u64,
    pub lookup_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// A target data store the pipeline may run generated queries against
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    pub dialect: String,
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8080/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout_secs: 50,
            max_tokens: 1200,
            temperature: 0.0,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "memory".to_string(),
            qdrant_url: None,
            collection: "nlq_patterns".to_string(),
            min_similarity: 0.75,
            top_k: 3,
            embedding_timeout_secs: 5,
            lookup_timeout_secs: 3,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 3,
            backoff_ms: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file first so overrides below can see it
        let _ = dotenv::dotenv();

        let config_file = env::var("NLQ_CONFIG").unwrap_or_else(|_| "nlq".to_string());

        let mut builder = config::Config::builder()
            .set_default("database.url", "./nlq.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.environment", "development")?
            .set_default("llm.gateway_url", "http://localhost:8080/v1")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.embedding_model", "text-embedding-3-small")?
            .set_default("llm.timeout_secs", 50)?
            .set_default("llm.max_tokens", 1200)?
            .set_default("llm.temperature", 0.0)?
            .set_default("cache.ttl_secs", 3600)?
            .set_default("cache.max_entries", 1000)?
            .set_default("rate_limit.max_requests", 10)?
            .set_default("rate_limit.window_secs", 900)?
            .set_default("execution.timeout_secs", 30)?
            .set_default("execution.default_limit", 1000)?
            .set_default("patterns.enabled", false)?
            .set_default("patterns.backend", "memory")?
            .set_default("patterns.collection", "nlq_patterns")?
            .set_default("patterns.min_similarity", 0.75)?
            .set_default("patterns.top_k", 3)?
            .set_default("patterns.embedding_timeout_secs", 5)?
            .set_default("patterns.lookup_timeout_secs", 3)?
            .set_default("background.queue_capacity", 256)?
            .set_default("background.max_attempts", 3)?
            .set_default("background.backoff_ms", 200)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?
            .add_source(config::File::with_name(&config_file).required(false));

        // Load from environment variables
        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(app_env) = env::var("APP_ENV") {
            builder = builder.set_override("server.environment", app_env)?;
        }

        if let Ok(gateway_url) = env::var("LLM_GATEWAY_URL") {
            builder = builder.set_override("llm.gateway_url", gateway_url)?;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            builder = builder.set_override("llm.model", model)?;
        }

        if let Ok(model) = env::var("LLM_EMBEDDING_MODEL") {
            builder = builder.set_override("llm.embedding_model", model)?;
        }

        if let Ok(timeout) = env::var("LLM_TIMEOUT_SECS") {
            builder = builder.set_override("llm.timeout_secs", timeout.parse::<u64>().unwrap_or(50))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Raw error detail is only exposed outside production
    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }
}
