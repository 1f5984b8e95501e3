use super::response::{ok, ok_list, ok_with_message, ApiResult};
use super::AppState;
use crate::domain::model::ApprovalStatus;
use crate::utils::error::GuardianError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalQuery {
    pub status: Option<ApprovalStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DecisionBody {
    pub user_id: Option<String>,
    pub reason: Option<String>,
}

impl DecisionBody {
    fn user(&self) -> &str {
        self.user_id.as_deref().unwrap_or("user-001")
    }
}

pub async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ApprovalQuery>,
) -> ApiResult {
    let approvals = state.service.list_approvals(query.status).await?;
    ok_list(&approvals)
}

pub async fn get_approval(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let approval = state
        .service
        .get_approval(&id)
        .await?
        .ok_or_else(|| GuardianError::not_found("Approval", id.as_str()))?;
    ok(approval)
}

/// body 可省略
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let approval = state.service.approve(&id, body.user()).await?;
    ok_with_message("Workflow approved", approval)
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let reason = body
        .reason
        .clone()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "No reason provided".to_string());
    let approval = state.service.reject(&id, body.user(), Some(reason)).await?;
    ok_with_message("Workflow rejected", approval)
}
