use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    CsvError(#[from] csv::Error),

    #[cfg(feature = "redis-store")]
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("LLM provider '{provider}' failed: {message}")]
    LlmError { provider: String, message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Step '{step}' failed: {details}")]
    ExecutionError { step: String, details: String },

    #[error("Workflow execution timed out after {minutes} minutes")]
    ExecutionTimeout { minutes: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Data,
    Storage,
    Workflow,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GuardianError {
    pub fn not_found(resource: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) | Self::LlmError { .. } => ErrorCategory::Network,
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            Self::SerializationError(_) | Self::CsvError(_) => ErrorCategory::Data,
            Self::IoError(_) | Self::StorageError { .. } => ErrorCategory::Storage,
            #[cfg(feature = "redis-store")]
            Self::RedisError(_) => ErrorCategory::Storage,
            Self::ExecutionError { .. } | Self::ExecutionTimeout { .. } => ErrorCategory::Workflow,
            Self::ValidationError { .. } | Self::NotFound { .. } | Self::Conflict { .. } => {
                ErrorCategory::Client
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Client => ErrorSeverity::Low,
            ErrorCategory::Network | ErrorCategory::Workflow => ErrorSeverity::Medium,
            ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    /// 給 API 呼叫者看的訊息，不洩漏內部細節
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ValidationError { message } => message.clone(),
            Self::NotFound { resource, .. } => format!("{} not found", resource),
            Self::Conflict { message } => message.clone(),
            Self::LlmError { .. } | Self::HttpError(_) => {
                "The planning model could not be reached".to_string()
            }
            Self::ExecutionError { step, .. } => format!("Workflow step '{}' failed", step),
            Self::ExecutionTimeout { .. } => "Workflow execution timed out".to_string(),
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check the LLM provider API key and network connectivity",
            ErrorCategory::Configuration => "Review the configuration file and environment variables",
            ErrorCategory::Data => "Inspect the payload for malformed JSON",
            ErrorCategory::Storage => "Verify the storage backend (Redis) is reachable",
            ErrorCategory::Workflow => "Inspect the execution step results and retry the workflow",
            ErrorCategory::Client => "Correct the request and try again",
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;
