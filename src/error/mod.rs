use crate::cache::CacheError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NewsroomError {
    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Malformed provider payloads, feeds or model replies
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// A news provider answered but signalled failure
    #[error("Provider Error: {0}")]
    ProviderError(String),

    /// Timeout errors for operations
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Cache/Redis errors
    #[error("Cache Error: {0}")]
    CacheError(String),

    /// The generation service failed or returned unusable content
    #[error("Generation Error: {0}")]
    GenerationError(String),

    /// Graph database errors
    #[error("Persistence Error: {0}")]
    PersistenceError(String),

    /// Scheduler misuse (e.g. a run requested while one is in flight)
    #[error("Scheduler Error: {0}")]
    SchedulerError(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for NewsroomError {
    fn from(err: serde_json::Error) -> Self {
        NewsroomError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<reqwest::Error> for NewsroomError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NewsroomError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            NewsroomError::ParseError(err.to_string())
        } else {
            NewsroomError::NetworkError(err.to_string())
        }
    }
}

impl From<CacheError> for NewsroomError {
    fn from(err: CacheError) -> Self {
        NewsroomError::CacheError(err.to_string())
    }
}

impl From<anyhow::Error> for NewsroomError {
    fn from(err: anyhow::Error) -> Self {
        NewsroomError::Unknown(format!("Anyhow error: {}", err))
    }
}

impl NewsroomError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            NewsroomError::ConfigError(_) => false, // Config needs fixing
            NewsroomError::NetworkError(_) => true,
            NewsroomError::ParseError(_) => false, // Data format issues aren't recoverable
            NewsroomError::ProviderError(msg) => {
                // Quota and rate limits clear up; bad keys do not
                !msg.contains("apiKeyInvalid") && !msg.contains("unauthorized")
            }
            NewsroomError::TimeoutError(_) => true,
            NewsroomError::CacheError(_) => true, // Redis might recover
            NewsroomError::GenerationError(msg) => {
                msg.contains("rate") || msg.contains("timeout") || msg.contains("overloaded")
            }
            NewsroomError::PersistenceError(_) => true,
            NewsroomError::SchedulerError(_) => false,
            NewsroomError::Unknown(_) => true,
        }
    }

    /// Categorizes error for logging
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            NewsroomError::ConfigError(_) => ErrorCategory::Configuration,
            NewsroomError::NetworkError(_) | NewsroomError::TimeoutError(_) => {
                ErrorCategory::Network
            }
            NewsroomError::ParseError(_) => ErrorCategory::Data,
            NewsroomError::ProviderError(_) => ErrorCategory::Provider,
            NewsroomError::CacheError(_) => ErrorCategory::Cache,
            NewsroomError::GenerationError(_) => ErrorCategory::Generation,
            NewsroomError::PersistenceError(_) => ErrorCategory::Persistence,
            NewsroomError::SchedulerError(_) | NewsroomError::Unknown(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    Provider,
    Cache,
    Generation,
    Persistence,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Network => "network",
            ErrorCategory::Data => "data",
            ErrorCategory::Provider => "provider",
            ErrorCategory::Cache => "cache",
            ErrorCategory::Generation => "generation",
            ErrorCategory::Persistence => "persistence",
            ErrorCategory::Internal => "internal",
        }
    }
}
