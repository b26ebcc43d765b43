use std::fmt::{self, Display};

/// Errors produced by model constructors and wire decoding.
#[derive(Debug)]
pub enum ModelError {
    Json(serde_json::Error),
    InvalidId(String),
    InvalidPayload(String),
    UnknownStatus(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Json(err) => write!(f, "json error: {err}"),
            ModelError::InvalidId(msg) => write!(f, "invalid id: {msg}"),
            ModelError::InvalidPayload(msg) => {
                write!(f, "invalid payload: {msg}")
            }
            ModelError::UnknownStatus(raw) => {
                write!(f, "unknown status value: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Json(err) => Some(err),
            ModelError::InvalidId(_)
            | ModelError::InvalidPayload(_)
            | ModelError::UnknownStatus(_) => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
