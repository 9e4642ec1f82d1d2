use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{model} noise model requires `{field}` on every update after the first")]
    MissingInput {
        model: &'static str,
        field: &'static str,
    },

    #[error("bar for unknown symbol {0}: not part of the configured universe")]
    UnknownSymbol(String),

    #[error("bar for {symbol} at {timestamp} is not after the last admitted bar")]
    OutOfOrder {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
