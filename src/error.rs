//! vaultkeep Error Types
//!
//! 코어 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;

/// vaultkeep 코어 에러
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unlock key required")]
    KeyRequired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<ApiError> for CoreError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Status { status: 401, .. } => CoreError::Unauthorized,
            ApiError::Status { status, body } => CoreError::Api {
                status,
                message: body,
            },
            ApiError::Network(msg) | ApiError::Decode(msg) => CoreError::Transport(msg),
        }
    }
}

/// 호스트(UI) 명령 응답용 직렬화 가능한 에러
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<CoreError> for CommandError {
    fn from(error: CoreError) -> Self {
        let code = match &error {
            CoreError::Store(_) => "STORE_ERROR",
            CoreError::Database(_) => "DB_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::KeyRequired => "KEY_REQUIRED",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::Api { .. } => "API_ERROR",
            CoreError::Transport(_) => "TRANSPORT_ERROR",
            CoreError::Config(_) => "CONFIG_ERROR",
        };

        let details = match &error {
            CoreError::Api { status, .. } => Some(format!("status {}", status)),
            _ => None,
        };

        CommandError {
            code: code.to_string(),
            message: error.to_string(),
            details,
        }
    }
}

/// 호스트 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;
