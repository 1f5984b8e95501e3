use clap::Parser;
use opsflow_guardian::utils::error::ErrorSeverity;
use opsflow_guardian::utils::logger;
use opsflow_guardian::{build_router, AppState, CliConfig, OrchestrationService};

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("🛑 Shutting down OpsFlow Guardian...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let settings = match cli.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(exit_code(e.severity()));
        }
    };

    // 初始化日誌
    logger::init_server_logger(&settings.logging.level, cli.verbose, settings.logging.json);

    tracing::info!("🚀 Starting OpsFlow Guardian");
    if cli.verbose {
        tracing::debug!(
            "LLM provider: {:?}, storage: {:?}, workflow: {:?}",
            settings.llm.provider,
            settings.storage.backend,
            settings.workflow
        );
    }

    let service = match OrchestrationService::from_settings(&settings).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(
                "❌ Service initialization failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(exit_code(e.severity()));
        }
    };

    let app = build_router(AppState::new(service), &settings.server.cors_origins);
    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("📊 API available at http://{}/api/v1", address);
    tracing::info!("🔗 Health check: http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
