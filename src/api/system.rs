use super::response::ApiResult;
use super::{AppState, API_VERSION};
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "OpsFlow Guardian 2.0 - AI-Powered Workflow Automation",
        "version": API_VERSION,
        "status": "operational",
        "storage": state.service.store().backend_name(),
        "features": [
            "AI-powered workflow planning",
            "Human approval workflows",
            "Complete audit trails",
        ],
    }))
}

/// 儲存與 LLM 供應商都可連線時為 healthy，否則 degraded
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = state.service.store();
    let storage_ok = match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("❌ Health check storage ping failed: {}", e);
            false
        }
    };
    let llm = state.service.llm();
    let llm_ok = llm.health_check().await;

    Json(json!({
        "status": if storage_ok && llm_ok { "healthy" } else { "degraded" },
        "version": API_VERSION,
        "services": {
            "api": "operational",
            "storage": if storage_ok { "connected" } else { "disconnected" },
            "storage_backend": store.backend_name(),
            "llm": if llm_ok { "available" } else { "unreachable" },
            "llm_provider": llm.name(),
            "llm_model": llm.model(),
        },
        "uptime_seconds": state.monitor.uptime().as_secs(),
    }))
}

pub async fn database_status(State(state): State<AppState>) -> ApiResult {
    let store = state.service.store();
    if let Err(e) = store.ping().await {
        return Ok(Json(json!({
            "connected": false,
            "backend": store.backend_name(),
            "error": e.user_friendly_message(),
            "setup_instructions": [
                "1. Ensure Redis is running",
                "2. Set STORAGE_BACKEND=redis and REDIS_URL (or storage.redis_url)",
                "3. Restart the server",
            ],
        })));
    }

    let mut counts = serde_json::Map::new();
    for prefix in ["agent", "plan", "execution", "approval", "audit"] {
        let total = store.keys(&format!("{}:", prefix)).await?.len();
        counts.insert(prefix.to_string(), total.into());
    }
    let total_records: u64 = counts.values().filter_map(Value::as_u64).sum();

    Ok(Json(json!({
        "connected": true,
        "backend": store.backend_name(),
        "records": counts,
        "status": if total_records > 0 { "operational" } else { "empty" },
    })))
}
