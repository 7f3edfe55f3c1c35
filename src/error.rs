use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation transient error: {0}")]
    GenerationTransient(String),

    #[error("Generation rate limited: {0}")]
    GenerationRateLimited(String),

    #[error("Generation authentication failed: {0}")]
    GenerationAuth(String),

    #[error("Generation quota exhausted: {0}")]
    GenerationQuota(String),

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("Keyword extraction failed: {0}")]
    Extraction(String),

    #[error("Human input unavailable: {0}")]
    HumanInput(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        match &e {
            octocrab::Error::GitHub { source, .. } => match source.status_code.as_u16() {
                404 => AppError::NotFound(source.message.clone()),
                429 => AppError::Network(format!("rate limited: {}", source.message)),
                code if code >= 500 => AppError::Network(source.message.clone()),
                _ => AppError::GitHubApi(source.message.clone()),
            },
            _ => AppError::Network(e.to_string()),
        }
    }
}

/// How the retry wrapper should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

/// Category recorded in the workflow's error audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Network,
    NotFound,
    Generation,
    Extraction,
    HumanInput,
    Contract,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Generation => "generation",
            ErrorKind::Extraction => "extraction",
            ErrorKind::HumanInput => "human_input",
            ErrorKind::Contract => "contract",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl AppError {
    /// Default classification used by the orchestrator's retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Network(_)
            | AppError::Timeout(_)
            | AppError::GenerationTransient(_)
            | AppError::GenerationRateLimited(_) => ErrorClass::Retryable,
            AppError::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorClass::Retryable
                } else if e.status().is_some_and(|s| s.is_server_error()) {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Fatal
                }
            }
            AppError::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::ConnectionReset => ErrorClass::Retryable,
                _ => ErrorClass::Fatal,
            },
            _ => ErrorClass::Fatal,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::Config(_) => ErrorKind::Validation,
            AppError::Network(_)
            | AppError::Timeout(_)
            | AppError::GitHubApi(_)
            | AppError::Http(_) => ErrorKind::Network,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Generation(_)
            | AppError::GenerationTransient(_)
            | AppError::GenerationRateLimited(_)
            | AppError::GenerationAuth(_)
            | AppError::GenerationQuota(_)
            | AppError::MalformedOutput(_) => ErrorKind::Generation,
            AppError::Extraction(_) => ErrorKind::Extraction,
            AppError::HumanInput(_) => ErrorKind::HumanInput,
            AppError::InvalidTransition { .. } => ErrorKind::Contract,
            AppError::Storage(_) | AppError::Io(_) | AppError::Serialization(_) => {
                ErrorKind::Storage
            }
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert_eq!(AppError::Network("reset".into()).class(), ErrorClass::Retryable);
        assert_eq!(AppError::Timeout("10s".into()).class(), ErrorClass::Retryable);
        assert_eq!(
            AppError::GenerationRateLimited("429".into()).class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            AppError::GenerationTransient("529".into()).class(),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn auth_quota_and_not_found_are_fatal() {
        assert_eq!(AppError::GenerationAuth("401".into()).class(), ErrorClass::Fatal);
        assert_eq!(AppError::GenerationQuota("402".into()).class(), ErrorClass::Fatal);
        assert_eq!(AppError::NotFound("README".into()).class(), ErrorClass::Fatal);
        assert_eq!(AppError::Validation("bad".into()).class(), ErrorClass::Fatal);
        assert_eq!(AppError::MalformedOutput("empty".into()).class(), ErrorClass::Fatal);
    }

    #[test]
    fn kinds_group_related_failures() {
        assert_eq!(AppError::Timeout("x".into()).kind(), ErrorKind::Network);
        assert_eq!(AppError::MalformedOutput("x".into()).kind(), ErrorKind::Generation);
        assert_eq!(
            AppError::InvalidTransition {
                from: "complete".into(),
                to: "analyzing".into()
            }
            .kind(),
            ErrorKind::Contract
        );
    }
}
