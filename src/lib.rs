pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::Settings;

pub use api::{build_router, AppState};
pub use core::OrchestrationService;
pub use utils::error::{GuardianError, Result};
