use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Everything that can go wrong talking to the server or the token store.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx response. `message` carries the body's `error` field when the
    /// server supplied one.
    #[error("HTTP {}: {}", .status, .message.as_deref().unwrap_or("request failed"))]
    Status { status: u16, message: Option<String> },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("token storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Operation referenced a task the local collection does not hold.
    #[error("unknown task id: {0}")]
    UnknownTask(i64),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Status { status: 401, .. })
    }

    /// The user-facing message: the server-supplied error string when there
    /// is one, otherwise the operation-specific fallback.
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            ClientError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

#[test]
fn test_message_or() {
    let err = ClientError::Status {
        status: 401,
        message: Some("Invalid credentials".to_string()),
    };
    assert_eq!(err.message_or("Login failed"), "Invalid credentials");
    assert!(err.is_unauthorized());

    let err = ClientError::Status {
        status: 500,
        message: None,
    };
    assert_eq!(err.message_or("Login failed"), "Login failed");
    assert!(!err.is_unauthorized());

    let err = ClientError::UnknownTask(7);
    assert_eq!(err.message_or("Failed to update task"), "Failed to update task");
    assert_eq!(err.to_string(), "unknown task id: 7");
}
