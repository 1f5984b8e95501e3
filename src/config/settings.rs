use crate::utils::error::{GuardianError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut cors_origins = Vec::new();
        for host in ["localhost", "127.0.0.1"] {
            for port in [5173, 8082, 8081, 8080, 3000] {
                cors_origins.push(format!("http://{}:{}", host, port));
            }
        }

        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            cors_origins,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Google,
    Openai,
    Anthropic,
    Offline,
}

impl LlmProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(Self::Google),
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "offline" | "mock" => Ok(Self::Offline),
            other => Err(GuardianError::InvalidConfigValueError {
                field: "llm.provider".to_string(),
                value: other.to_string(),
                reason: "Allowed values: google, openai, anthropic, offline".to_string(),
            }),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Google => "gemini-1.5-flash",
            Self::Openai => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Offline => "offline-planner",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub model: Option<String>,
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// 覆寫供應商的 API base URL (測試或代理用)
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Google,
            model: None,
            google_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            base_url: None,
            timeout_seconds: 60,
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// 目前供應商對應的 API key
    pub fn api_key(&self) -> Option<&str> {
        let key = match self.provider {
            LlmProviderKind::Google => self.google_api_key.as_deref(),
            LlmProviderKind::Openai => self.openai_api_key.as_deref(),
            LlmProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
            LlmProviderKind::Offline => None,
        };
        key.filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "opsflow".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_workflow_steps: usize,
    pub max_concurrent_workflows: usize,
    pub max_execution_time_minutes: u64,
    /// 每個步驟模擬執行的時間
    pub step_delay_ms: u64,
    pub risk_threshold: f64,
    /// 載入展示用的種子資料 (workflow-001 等)
    pub seed_demo_data: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_workflow_steps: 10,
            max_concurrent_workflows: 5,
            max_execution_time_minutes: 30,
            step_delay_ms: 2000,
            risk_threshold: 0.7,
            seed_demo_data: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| GuardianError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GOOGLE_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| GuardianError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 以環境變數覆寫設定，`lookup` 方便測試注入
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GOOGLE_API_KEY") {
            self.llm.google_api_key = Some(key);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(key);
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = LlmProviderKind::parse(&provider)?;
        }
        if let Some(model) = lookup("LLM_MODEL").or_else(|| lookup("GEMINI_MODEL")) {
            self.llm.model = Some(model);
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.storage.redis_url = url;
        }
        if let Some(backend) = lookup("STORAGE_BACKEND") {
            self.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "redis" => StorageBackend::Redis,
                other => {
                    return Err(GuardianError::InvalidConfigValueError {
                        field: "storage.backend".to_string(),
                        value: other.to_string(),
                        reason: "Allowed values: memory, redis".to_string(),
                    })
                }
            };
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| GuardianError::InvalidConfigValueError {
                field: "server.port".to_string(),
                value: port.clone(),
                reason: "Port must be a number between 1 and 65535".to_string(),
            })?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_ascii_lowercase();
        }
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("server.host", &self.server.host)?;
        validation::validate_range("server.port", self.server.port, 1, u16::MAX)?;

        if let Some(base_url) = &self.llm.base_url {
            validation::validate_url("llm.base_url", base_url)?;
        }
        validation::validate_range("llm.timeout_seconds", self.llm.timeout_seconds, 1, 600)?;
        validation::validate_range("llm.temperature", self.llm.temperature, 0.0, 1.0)?;

        if self.storage.backend == StorageBackend::Redis {
            validation::validate_url_with_schemes(
                "storage.redis_url",
                &self.storage.redis_url,
                &["redis", "rediss"],
            )?;
        }

        validation::validate_positive_number(
            "workflow.max_workflow_steps",
            self.workflow.max_workflow_steps,
            1,
        )?;
        validation::validate_range(
            "workflow.max_concurrent_workflows",
            self.workflow.max_concurrent_workflows,
            1,
            100,
        )?;
        validation::validate_range("workflow.risk_threshold", self.workflow.risk_threshold, 0.0, 1.0)?;
        validation::validate_one_of(
            "logging.level",
            &self.logging.level,
            &["trace", "debug", "info", "warn", "error"],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.bind_address(), "0.0.0.0:8001");
        assert_eq!(settings.llm.provider, LlmProviderKind::Google);
        assert_eq!(settings.llm.model(), "gemini-1.5-flash");
        assert_eq!(settings.workflow.step_delay_ms, 2000);
        assert_eq!(settings.server.cors_origins.len(), 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_content = r#"
[server]
port = 9000

[llm]
provider = "openai"
model = "gpt-4o"

[workflow]
step_delay_ms = 10
"#;

        let settings = Settings::from_toml_str(toml_content).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.llm.provider, LlmProviderKind::Openai);
        assert_eq!(settings.llm.model(), "gpt-4o");
        assert_eq!(settings.workflow.step_delay_ms, 10);
        assert_eq!(settings.workflow.max_workflow_steps, 10);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("OPSFLOW_TEST_GOOGLE_KEY", "substituted-key");

        let toml_content = r#"
[llm]
google_api_key = "${OPSFLOW_TEST_GOOGLE_KEY}"
"#;

        let settings = Settings::from_toml_str(toml_content).unwrap();
        assert_eq!(settings.llm.google_api_key.as_deref(), Some("substituted-key"));
        assert_eq!(settings.llm.api_key(), Some("substituted-key"));

        std::env::remove_var("OPSFLOW_TEST_GOOGLE_KEY");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LLM_PROVIDER", "anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("REDIS_URL", "redis://cache:6379"),
            ("PORT", "8123"),
            ("LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env_with(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.llm.provider, LlmProviderKind::Anthropic);
        assert_eq!(settings.llm.api_key(), Some("sk-ant"));
        // 只有 STORAGE_BACKEND 能切換後端
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.storage.redis_url, "redis://cache:6379");
        assert_eq!(settings.server.port, 8123);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_storage_backend_env_selects_redis() {
        let mut settings = Settings::default();
        settings
            .apply_env_with(|name| match name {
                "STORAGE_BACKEND" => Some("Redis".to_string()),
                "REDIS_URL" => Some("redis://cache:6379".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Redis);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_from_env() {
        let mut settings = Settings::default();
        let result = settings.apply_env_with(|name| (name == "PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[llm]
base_url = "not a url"
"#;

        let settings = Settings::from_toml_str(toml_content).unwrap();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.storage.backend = StorageBackend::Redis;
        settings.storage.redis_url = "http://localhost:6379".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[logging]
level = "warn"
json = true
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let settings = Settings::from_file(temp_file.path()).unwrap();
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.logging.json);
    }
}
