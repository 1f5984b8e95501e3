#[cfg(feature = "cli")]
pub mod cli;
pub mod settings;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use settings::{
    LlmConfig, LlmProviderKind, LoggingConfig, ServerConfig, Settings, StorageBackend,
    StorageConfig, WorkflowConfig,
};
