use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(level: &str, verbose: bool) -> EnvFilter {
    let directives = if verbose {
        "opsflow_guardian=debug,tower_http=debug,info".to_string()
    } else {
        format!("opsflow_guardian={},tower_http=info,warn", level)
    };

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// 初始化伺服器日誌，`RUST_LOG` 優先於設定檔的 level
pub fn init_server_logger(level: &str, verbose: bool, json: bool) {
    let filter = default_filter(level, verbose);

    if json {
        // JSON 格式方便集中式日誌收集
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .init();
    }
}
