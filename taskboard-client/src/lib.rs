//! HTTP client and command-line front end for the task board engine.

pub mod config;
pub mod http;
pub mod render;

use taskboard_core::PersistenceError;

pub use config::{default_config_path, load_config, ClientConfig, ConfigError};
pub use http::HttpTaskStore;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Unknown drop target: {0}")]
    Target(String),

    #[error("{0}")]
    Mutation(String),
}
