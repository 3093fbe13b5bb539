//! Environment-driven configuration.
//!
//! Every knob comes from an environment variable (loaded through a `.env`
//! file when present). Only the model endpoint and credential are required;
//! everything else has a local-development default.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use crate::engine::EngineSettings;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing required environment variable {key}")]
    #[diagnostic(
        code(docparley::config::missing),
        help("Set the variable in the environment or in a .env file.")
    )]
    MissingVar { key: &'static str },

    #[error("failed to parse environment variable {key}: {message}")]
    #[diagnostic(code(docparley::config::parse))]
    EnvParse { key: &'static str, message: String },
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub object_store_root: String,
    pub storage_bucket: String,
    pub storage_prefix: String,
    pub openai_base_url: String,
    pub openai_api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieve_top_k: usize,
    pub history_window: usize,
    pub index_cache_capacity: usize,
    pub prompt_cost_per_1k: f64,
    pub completion_cost_per_1k: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: parsed("BIND_ADDR", "127.0.0.1:8000")?,
            database_url: var_or("DATABASE_URL", "sqlite://docparley.db"),
            object_store_root: var_or("OBJECT_STORE_ROOT", "./object-store"),
            storage_bucket: var_or("STORAGE_BUCKET", "docparley"),
            storage_prefix: var_or("STORAGE_PREFIX", "documents"),
            openai_base_url: required("OPENAI_BASE_URL")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            chat_model: var_or("CHAT_MODEL", "gpt-4"),
            embedding_model: var_or("EMBEDDING_MODEL", "text-embedding-ada-002"),
            chunk_size: parsed("CHUNK_SIZE", "1000")?,
            chunk_overlap: parsed("CHUNK_OVERLAP", "100")?,
            retrieve_top_k: parsed("RETRIEVE_TOP_K", "4")?,
            history_window: parsed("HISTORY_WINDOW", "10")?,
            index_cache_capacity: parsed("INDEX_CACHE_CAPACITY", "4")?,
            prompt_cost_per_1k: parsed("PROMPT_COST_PER_1K", "0")?,
            completion_cost_per_1k: parsed("COMPLETION_COST_PER_1K", "0")?,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            history_window: self.history_window,
            index_cache_capacity: self.index_cache_capacity,
        }
    }
}

fn var_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar { key })
}

fn parsed<T>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var_or(key, default)
        .parse()
        .map_err(|err: T::Err| ConfigError::EnvParse {
            key,
            message: err.to_string(),
        })
}
