//! LLM 供應商介接
//!
//! 三家供應商 (Google Gemini、OpenAI、Anthropic) 都走 HTTP JSON API，
//! 差異只在 URL、認證 header 與回應格式。沒有 API key 時改用
//! `OfflineProvider`，讓服務在無網路環境也能產生計畫。

use crate::config::{LlmConfig, LlmProviderKind};
use crate::domain::ports::{LlmProvider, LlmRequest, LlmResponse};
use crate::utils::error::{GuardianError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP 供應商的 API 格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Gemini,
    OpenAi,
    Anthropic,
}

impl Dialect {
    fn from_kind(kind: LlmProviderKind) -> Option<Self> {
        match kind {
            LlmProviderKind::Google => Some(Self::Gemini),
            LlmProviderKind::Openai => Some(Self::OpenAi),
            LlmProviderKind::Anthropic => Some(Self::Anthropic),
            LlmProviderKind::Offline => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Gemini => "google",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::OpenAi => "https://api.openai.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }
}

pub struct HttpLlmProvider {
    dialect: Dialect,
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// reqwest 錯誤訊息會帶完整 URL，先移除再往外傳
fn transport_error(e: reqwest::Error) -> GuardianError {
    GuardianError::HttpError(e.without_url())
}

impl HttpLlmProvider {
    pub fn new(
        kind: LlmProviderKind,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let dialect = Dialect::from_kind(kind).ok_or_else(|| GuardianError::ConfigError {
            message: "offline provider has no HTTP endpoint".to_string(),
        })?;

        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url
            .unwrap_or_else(|| dialect.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            dialect,
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn completion_request(&self, request: &LlmRequest) -> reqwest::RequestBuilder {
        match self.dialect {
            Dialect::Gemini => {
                let url = format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, self.model
                );
                let mut body = json!({
                    "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
                    "generationConfig": {
                        "temperature": request.temperature,
                        "maxOutputTokens": request.max_tokens,
                    }
                });
                if let Some(system) = &request.system {
                    body["systemInstruction"] = json!({"parts": [{"text": system}]});
                }
                self.client
                    .post(url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
            }
            Dialect::OpenAi => {
                let mut messages = Vec::new();
                if let Some(system) = &request.system {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": request.prompt}));
                self.client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .bearer_auth(&self.api_key)
                    .json(&json!({
                        "model": self.model,
                        "messages": messages,
                        "temperature": request.temperature,
                        "max_tokens": request.max_tokens,
                    }))
            }
            Dialect::Anthropic => {
                let mut body = json!({
                    "model": self.model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "messages": [{"role": "user", "content": request.prompt}],
                });
                if let Some(system) = &request.system {
                    body["system"] = json!(system);
                }
                self.client
                    .post(format!("{}/v1/messages", self.base_url))
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }

    /// 從供應商回應取出文字與 token 用量
    fn extract_content(&self, data: &Value) -> Option<(String, Option<u32>)> {
        let (text, tokens) = match self.dialect {
            Dialect::Gemini => (
                data.pointer("/candidates/0/content/parts/0/text")?.as_str()?,
                data.pointer("/usageMetadata/totalTokenCount").and_then(Value::as_u64),
            ),
            Dialect::OpenAi => (
                data.pointer("/choices/0/message/content")?.as_str()?,
                data.pointer("/usage/total_tokens").and_then(Value::as_u64),
            ),
            Dialect::Anthropic => {
                let input = data.pointer("/usage/input_tokens").and_then(Value::as_u64);
                let output = data.pointer("/usage/output_tokens").and_then(Value::as_u64);
                (
                    data.pointer("/content/0/text")?.as_str()?,
                    input.zip(output).map(|(i, o)| i + o),
                )
            }
        };
        Some((text.to_string(), tokens.map(|t| t as u32)))
    }

    fn error(&self, message: impl Into<String>) -> GuardianError {
        GuardianError::LlmError {
            provider: self.name().to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        self.dialect.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let start = Instant::now();
        tracing::debug!("Sending prompt to {} ({})", self.name(), self.model);

        let response = self
            .completion_request(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("{} returned {}: {}", self.name(), status, body)));
        }

        let data: Value = response.json().await.map_err(transport_error)?;
        let (content, tokens_used) = self
            .extract_content(&data)
            .ok_or_else(|| self.error("response did not contain any text"))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!("{} answered in {}ms", self.name(), duration_ms);

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            tokens_used,
            duration_ms,
        })
    }

    async fn health_check(&self) -> bool {
        let request = match self.dialect {
            Dialect::Gemini => self
                .client
                .get(format!("{}/v1beta/models", self.base_url))
                .header("x-goog-api-key", &self.api_key),
            Dialect::OpenAi => self
                .client
                .get(format!("{}/v1/models", self.base_url))
                .bearer_auth(&self.api_key),
            Dialect::Anthropic => self
                .client
                .get(format!("{}/v1/models", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        match request.timeout(Duration::from_secs(5)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!("⚠️ {} health check failed: {}", self.name(), e.without_url());
                false
            }
        }
    }
}

/// 離線規劃器，回傳固定結構的 JSON 計畫
#[derive(Debug, Clone, Default)]
pub struct OfflineProvider;

impl OfflineProvider {
    fn request_line(prompt: &str) -> &str {
        prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix("REQUEST:"))
            .map(str::trim)
            .unwrap_or("the submitted request")
    }
}

#[async_trait]
impl LlmProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn model(&self) -> &str {
        LlmProviderKind::Offline.default_model()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let summary = format!("Automated plan for: {}", Self::request_line(&request.prompt));
        let plan = json!({
            "plan_summary": summary,
            "overall_risk": "medium",
            "steps": [
                {
                    "name": "Initialize Process",
                    "description": "Set up initial parameters and validate inputs",
                    "tool_integrations": ["internal"],
                    "risk_level": "low",
                    "requires_approval": false,
                    "estimated_duration": 5
                },
                {
                    "name": "Execute Main Actions",
                    "description": "Perform the primary workflow operations",
                    "tool_integrations": ["google_workspace", "slack"],
                    "risk_level": "medium",
                    "requires_approval": true,
                    "estimated_duration": 15
                },
                {
                    "name": "Finalize and Notify",
                    "description": "Complete workflow and send notifications",
                    "tool_integrations": ["email", "audit"],
                    "risk_level": "low",
                    "requires_approval": false,
                    "estimated_duration": 5
                }
            ]
        });

        Ok(LlmResponse {
            content: plan.to_string(),
            model: self.model().to_string(),
            tokens_used: None,
            duration_ms: 0,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// 依設定建立 LLM 供應商，缺少 API key 時退回離線模式
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    if config.provider == LlmProviderKind::Offline {
        tracing::info!("🧪 Using offline planner");
        return Ok(Arc::new(OfflineProvider));
    }

    let Some(api_key) = config.api_key() else {
        tracing::warn!(
            "⚠️ No API key configured for {:?}, falling back to offline planner",
            config.provider
        );
        return Ok(Arc::new(OfflineProvider));
    };

    let provider = HttpLlmProvider::new(
        config.provider,
        api_key,
        config.model(),
        config.base_url.clone(),
        Duration::from_secs(config.timeout_seconds),
    )?;
    tracing::info!("🤖 Using {} model {}", provider.name(), provider.model());
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn provider(kind: LlmProviderKind, server: &MockServer) -> HttpLlmProvider {
        HttpLlmProvider::new(kind, "test-key", "test-model", Some(server.base_url()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_google_generate_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/test-model:generateContent")
                .header("x-goog-api-key", "test-key");
            then.status(200).json_body(json!({
                "candidates": [{"content": {"parts": [{"text": "plan text"}]}}],
                "usageMetadata": {"totalTokenCount": 42}
            }));
        });

        let response = provider(LlmProviderKind::Google, &server)
            .complete(&LlmRequest::new("hello"))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.content, "plan text");
        assert_eq!(response.tokens_used, Some(42));
        assert_eq!(response.model, "test-model");
    }

    #[tokio::test]
    async fn test_openai_chat_completion_sends_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "done"}}],
                "usage": {"total_tokens": 7}
            }));
        });

        let request = LlmRequest::new("hello").with_system("You are the Planner Agent");
        let response = provider(LlmProviderKind::Openai, &server).complete(&request).await.unwrap();

        mock.assert();
        assert_eq!(response.content, "done");
        assert_eq!(response.tokens_used, Some(7));
    }

    #[tokio::test]
    async fn test_anthropic_messages_sums_usage() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", ANTHROPIC_VERSION);
            then.status(200).json_body(json!({
                "content": [{"type": "text", "text": "anthropic plan"}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }));
        });

        let response = provider(LlmProviderKind::Anthropic, &server)
            .complete(&LlmRequest::new("hello"))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.content, "anthropic plan");
        assert_eq!(response.tokens_used, Some(15));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).body("invalid api key");
        });

        let err = provider(LlmProviderKind::Openai, &server)
            .complete(&LlmRequest::new("hello"))
            .await
            .unwrap_err();

        match err {
            GuardianError::LlmError { provider, message } => {
                assert_eq!(provider, "openai");
                assert!(message.contains("invalid api key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200).json_body(json!({"data": []}));
        });

        assert!(provider(LlmProviderKind::Openai, &server).health_check().await);
    }

    #[tokio::test]
    async fn test_google_key_stays_out_of_url_and_errors() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1beta/models")
                .header("x-goog-api-key", "test-key");
            then.status(200).json_body(json!({"models": []}));
        });
        assert!(provider(LlmProviderKind::Google, &server).health_check().await);
        mock.assert();

        // 連不上的埠，錯誤訊息不可帶出 key
        let unreachable = HttpLlmProvider::new(
            LlmProviderKind::Google,
            "SUPERSECRETKEY",
            "m",
            Some("http://127.0.0.1:1".to_string()),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = unreachable.complete(&LlmRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, GuardianError::HttpError(_)));
        assert!(!err.to_string().contains("SUPERSECRETKEY"));
        assert!(!format!("{err:?}").contains("SUPERSECRETKEY"));
    }

    #[test]
    fn test_offline_kind_has_no_http_provider() {
        let result = HttpLlmProvider::new(
            LlmProviderKind::Offline,
            "key",
            "model",
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(GuardianError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_offline_provider_echoes_request() {
        let prompt = "You are the Planner Agent.\n\nREQUEST: Onboard Acme Corp\n\nCONTEXT:";
        let response = OfflineProvider.complete(&LlmRequest::new(prompt)).await.unwrap();
        let plan: Value = serde_json::from_str(&response.content).unwrap();
        assert_eq!(plan["plan_summary"], "Automated plan for: Onboard Acme Corp");
        assert_eq!(plan["steps"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_api_key_falls_back_to_offline() {
        let config = LlmConfig::default();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "offline");
    }
}
