use super::response::{ok, ok_list, ApiResult};
use super::AppState;
use crate::core::analytics;
use crate::domain::model::Agent;
use crate::utils::error::GuardianError;
use axum::extract::{Path, State};
use serde::Serialize;

/// Agent 加上計算欄位
#[derive(Serialize)]
struct AgentView<'a> {
    #[serde(flatten)]
    agent: &'a Agent,
    success_rate: f64,
}

impl<'a> From<&'a Agent> for AgentView<'a> {
    fn from(agent: &'a Agent) -> Self {
        Self {
            agent,
            success_rate: agent.success_rate(),
        }
    }
}

pub async fn list_agents(State(state): State<AppState>) -> ApiResult {
    let agents = state.service.get_all_agents().await?;
    let views: Vec<AgentView> = agents.iter().map(AgentView::from).collect();
    ok_list(&views)
}

pub async fn get_agent(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let agent = state
        .service
        .get_agent_status(&id)
        .await?
        .ok_or_else(|| GuardianError::not_found("Agent", id.as_str()))?;
    ok(AgentView::from(&agent))
}

pub async fn get_agent_metrics(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let metrics = analytics::agent_metrics(&state.service, &state.monitor, &id).await?;
    ok(metrics)
}
