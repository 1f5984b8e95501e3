// Adapters layer: concrete implementations of the domain ports (storage, LLM, step runners).

pub mod llm;
pub mod runner;
pub mod storage;

pub use llm::{build_provider, HttpLlmProvider, OfflineProvider};
pub use runner::SimulatedStepRunner;
pub use storage::{build_store, MemoryStore};
#[cfg(feature = "redis-store")]
pub use storage::RedisStore;
