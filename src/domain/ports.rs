use crate::domain::model::WorkflowStep;
use crate::utils::error::Result;
use async_trait::async_trait;

/// JSON key-value 儲存，key 格式為 `agent:{id}`、`plan:{id}` 等
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()>;
    /// 列出指定前綴的所有 key (已排序)
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
    async fn ping(&self) -> Result<()>;
    fn backend_name(&self) -> &'static str;
}

/// 送給 LLM 的請求
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.2,
            max_tokens: 2048,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
    async fn health_check(&self) -> bool;
}

/// 執行單一工作流程步驟，回傳輸出訊息
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, step: &WorkflowStep) -> Result<String>;
}
