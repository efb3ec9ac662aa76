//! Error types for the status bar controllers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no byte counter provider available")]
    NoCounterProvider,

    #[error("counter read failed: {0}")]
    Counters(String),

    #[error("display metrics unavailable: {0}")]
    DisplayMetrics(String),

    #[error("backlight write failed: {0}")]
    Backlight(String),

    #[error("settings store error: {0}")]
    Settings(String),

    #[error("invalid value for preference {key}: {value}")]
    InvalidPreference { key: String, value: String },

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(key: &str, value: impl std::fmt::Display) -> Self {
        Error::InvalidPreference {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
