use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid profile fields: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("Missing credential for session: {0}")]
    MissingCredential(String),

    #[error("Teardown error: {0}")]
    Teardown(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
}

/// Serializable error for the UI layer
#[derive(Serialize)]
pub struct SerializableError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for SerializableError {
    fn from(err: &AppError) -> Self {
        let (code, message, details) = match err {
            AppError::Ssh(msg) => ("SSH_ERROR", msg.clone(), None),
            AppError::Connection(msg) => ("CONNECTION_ERROR", msg.clone(), None),
            AppError::Auth(msg) => ("AUTH_ERROR", "Authentication failed".to_string(), Some(msg.clone())),
            AppError::Validation { fields } => (
                "VALIDATION_ERROR",
                "Invalid profile fields".to_string(),
                Some(fields.join(", ")),
            ),
            AppError::MissingCredential(id) => (
                "MISSING_CREDENTIAL",
                format!("Session {} requires a password for this operation", id),
                None,
            ),
            AppError::Teardown(msg) => ("TEARDOWN_ERROR", msg.clone(), None),
            AppError::Config(msg) => ("CONFIG_ERROR", msg.clone(), None),
            AppError::Io(e) => ("IO_ERROR", e.to_string(), None),
            AppError::Serialization(msg) => ("SERIALIZATION_ERROR", msg.clone(), None),
            AppError::SessionNotFound(id) => ("SESSION_NOT_FOUND", format!("Session {} not found", id), None),
            AppError::ProfileNotFound(id) => ("PROFILE_NOT_FOUND", format!("Profile {} not found", id), None),
        };

        SerializableError {
            code: code.to_string(),
            message,
            details,
        }
    }
}

// Implement Serialize for AppError so the UI layer can render it directly
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        SerializableError::from(self).serialize(serializer)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_joins_fields() {
        let err = AppError::Validation {
            fields: vec!["name".to_string(), "host".to_string()],
        };
        assert_eq!(err.to_string(), "Invalid profile fields: name, host");
    }

    #[test]
    fn test_serializable_error_codes() {
        let err = AppError::SessionNotFound("web-01".to_string());
        let ser = SerializableError::from(&err);
        assert_eq!(ser.code, "SESSION_NOT_FOUND");
        assert!(ser.message.contains("web-01"));
    }
}
