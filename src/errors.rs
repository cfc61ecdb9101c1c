// ABOUTME: Error types for the lecture-deck application
// ABOUTME: Provides structured error handling for loading, rendering and serving decks

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("Failed to read file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to fetch remote resource: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error("Invalid resource path: {0}")]
    InvalidResourcePath(String),

    #[error("Invalid content key: {0}")]
    InvalidContentKey(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Course metadata error: {0}")]
    CourseError(String),

    #[error("Malformed JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Input validation error: {0}")]
    ValidationError(String),

    #[error("Path not found: {0}")]
    PathNotFoundError(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

// Implement conversion from anyhow::Error to our DeckError
impl From<anyhow::Error> for DeckError {
    fn from(err: anyhow::Error) -> Self {
        DeckError::UnknownError(err.to_string())
    }
}

// WebSocket failures only ever surface inside a session
impl From<tungstenite::Error> for DeckError {
    fn from(err: tungstenite::Error) -> Self {
        DeckError::SessionError(format!("WebSocket failure: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;
