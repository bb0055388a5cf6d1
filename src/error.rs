use crate::notify::DeliveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error(transparent)]
    Query(#[from] QueryFailure),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Settings(#[from] ::config::ConfigError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[error("query '{query}' failed: {cause}")]
pub struct QueryFailure {
    pub query: String,
    pub cause: String,
}

impl QueryFailure {
    pub fn new(query: impl Into<String>, cause: impl ToString) -> Self {
        Self {
            query: query.into(),
            cause: cause.to_string(),
        }
    }
}
