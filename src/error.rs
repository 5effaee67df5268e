use thiserror::Error;

use crate::quiz::attempt::Phase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("respondent name is required")]
    EmptyName,

    #[error("no questions to attempt")]
    NoQuestions,

    #[error("attempt is {0:?}")]
    WrongPhase(Phase),

    #[error("time limit reached")]
    Expired,

    #[error("option {0} is out of range")]
    InvalidOption(usize),

    #[error("item {0} is out of range")]
    InvalidItem(usize),
}

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("spreadsheet is not configured: {0}")]
    NotConfigured(String),

    #[error("spreadsheet credentials were rejected: {0}")]
    Unauthorized(String),

    #[error("spreadsheet request failed with HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid spreadsheet url")]
    BadUrl,
}

impl SheetsError {
    /// Credential and configuration problems, as opposed to transport failures.
    pub fn is_auth(&self) -> bool {
        matches!(self, SheetsError::NotConfigured(_) | SheetsError::Unauthorized(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be a whole number from 1 to {max}, got {value:?}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        max: usize,
    },
}
