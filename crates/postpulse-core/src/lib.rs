pub mod app_config;
pub mod config;
pub mod identifiers;
pub mod post;
pub mod selectors;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, StoreBackend};
pub use config::{load_app_config, load_app_config_from_env};
pub use identifiers::{canonical_profile_url, normalize_hashtag, profile_username};
pub use post::{
    dedupe_by_text, is_substantive, rank_by_engagement, text_key, Post, PostError, PostOrigin,
    PostSource,
};
pub use selectors::{load_selectors, load_selectors_if_present, MetricSelectors, SelectorConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read selectors file {path}: {source}")]
    SelectorsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse selectors file: {0}")]
    SelectorsFileParse(#[from] serde_yaml::Error),

    #[error("selector validation failed: {0}")]
    Validation(String),
}
