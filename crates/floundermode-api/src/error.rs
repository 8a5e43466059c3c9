use floundermode_core::DictionaryError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("upstream returned {status}{}", message_suffix(.message))]
    Upstream { status: u16, message: Option<String> },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error on `{field}`: {message}")]
    Validation { field: &'static str, message: String },
    #[error("storage error: {0}")]
    Storage(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|message| format!(": {message}")).unwrap_or_default()
}

impl ApiError {
    /// Failures that a static fallback dataset may stand in for.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout(_) | Self::Network(_))
    }

    pub(crate) fn missing(field: &'static str) -> Self {
        Self::Validation { field, message: format!("`{field}` is required") }
    }
}

impl From<DictionaryError> for ApiError {
    fn from(err: DictionaryError) -> Self {
        match err {
            DictionaryError::Validation { field, message } => Self::Validation { field, message },
            DictionaryError::MissingArgument(field) => Self::missing(field),
            DictionaryError::UnknownDefinition(id) => Self::NotFound(format!("definition {id}")),
            other => Self::Decode(other.to_string()),
        }
    }
}
