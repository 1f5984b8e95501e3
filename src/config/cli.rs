use crate::config::settings::{LlmProviderKind, Settings};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "opsflow-guardian")]
#[command(about = "AI-powered workflow automation backend with human approvals and audit trails")]
pub struct CliConfig {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "OPSFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// LLM provider: google, openai, anthropic or offline
    #[arg(long)]
    pub provider: Option<String>,

    /// Simulated duration of each workflow step in milliseconds
    #[arg(long)]
    pub step_delay_ms: Option<u64>,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    /// 設定優先順序: 預設值 < TOML 檔 < 環境變數 < 命令列參數
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        settings.apply_env()?;

        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(provider) = &self.provider {
            settings.llm.provider = LlmProviderKind::parse(provider)?;
        }
        if let Some(delay) = self.step_delay_ms {
            settings.workflow.step_delay_ms = delay;
        }
        if self.json_logs {
            settings.logging.json = true;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_win() {
        let cli = CliConfig::parse_from([
            "opsflow-guardian",
            "--port",
            "9100",
            "--provider",
            "offline",
            "--step-delay-ms",
            "5",
        ]);

        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.llm.provider, LlmProviderKind::Offline);
        assert_eq!(settings.workflow.step_delay_ms, 5);
    }
}
