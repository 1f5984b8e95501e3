//! HTTP 介面 (axum)，業務路由掛在 `/api/v1` 之下

pub mod agents;
pub mod analytics;
pub mod approvals;
pub mod audit;
pub mod auth;
pub mod response;
pub mod system;
pub mod workflows;

use crate::core::OrchestrationService;
use crate::utils::monitor::SystemMonitor;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const API_VERSION: &str = "2.0.0";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrchestrationService>,
    pub monitor: SystemMonitor,
}

impl AppState {
    pub fn new(service: Arc<OrchestrationService>) -> Self {
        Self {
            service,
            monitor: SystemMonitor::new(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/agents", get(agents::list_agents))
        .route("/agents/{id}", get(agents::get_agent))
        .route("/agents/{id}/metrics", get(agents::get_agent_metrics))
        .route("/workflows", get(workflows::list_workflows))
        .route("/workflows/create", post(workflows::create_workflow))
        .route("/workflows/templates", get(workflows::list_templates))
        .route(
            "/workflows/executions/{execution_id}",
            get(workflows::get_execution),
        )
        .route("/workflows/{id}", get(workflows::get_workflow))
        .route("/workflows/{id}/execute", post(workflows::execute_workflow))
        .route("/workflows/{id}/status", get(workflows::get_workflow_status))
        .route("/approvals", get(approvals::list_approvals))
        .route("/approvals/{id}", get(approvals::get_approval))
        .route("/approvals/{id}/approve", post(approvals::approve))
        .route("/approvals/{id}/reject", post(approvals::reject))
        .route("/audit", get(audit::list_events))
        .route("/audit/export", get(audit::export_events))
        .route("/analytics/dashboard", get(analytics::dashboard))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/database/status", get(system::database_status))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}
