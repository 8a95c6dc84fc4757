use serde_json::Value;
use signcfg_core::errors::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host base url is not configured")]
    NotConfigured,
    #[error("invalid host base url `{0}`")]
    InvalidBaseUrl(String),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("host responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Shape(String),
}

impl HostError {
    pub fn shape(detail: impl Into<String>) -> Self {
        Self::Shape(detail.into())
    }

    pub fn into_remote(self, operation: &str) -> RemoteError {
        match self {
            Self::Status { status: 404, message } => RemoteError::not_found(message),
            Self::Status { status, message } if (400..500).contains(&status) => {
                RemoteError::rejected(operation, format!("status {status}: {message}"))
            }
            Self::Status { status, message } => {
                RemoteError::transport(operation, format!("status {status}: {message}"))
            }
            Self::Shape(detail) => RemoteError::unexpected(operation, detail),
            error @ (Self::NotConfigured | Self::InvalidBaseUrl(_) | Self::Http(_)) => {
                RemoteError::transport(operation, error.to_string())
            }
        }
    }
}

/// Best human-readable message from a host error body.
///
/// Tries the server message list first, then the exception text, then the exception type.
pub fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(trimmed) else {
        return truncate(trimmed);
    };

    if let Some(message) = payload
        .get("_server_messages")
        .and_then(Value::as_str)
        .and_then(first_server_message)
    {
        return message;
    }

    for key in ["exception", "exc_type", "message"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return truncate(text.trim());
            }
        }
    }

    truncate(trimmed)
}

// `_server_messages` is a JSON array of JSON-encoded objects.
fn first_server_message(raw: &str) -> Option<String> {
    let entries: Vec<String> = serde_json::from_str(raw).ok()?;
    entries.iter().find_map(|entry| {
        let decoded: Value = serde_json::from_str(entry).ok()?;
        decoded
            .get("message")
            .and_then(Value::as_str)
            .map(|message| truncate(message.trim()))
            .filter(|message| !message.is_empty())
    })
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 300;
    if text.chars().count() <= LIMIT {
        return text.to_owned();
    }
    let mut cut = text.chars().take(LIMIT).collect::<String>();
    cut.push('…');
    cut
}
