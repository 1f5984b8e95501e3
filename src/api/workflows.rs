use super::response::{ok, ok_list, ok_with_message, ApiResult};
use super::AppState;
use crate::core::demo::workflow_templates;
use crate::core::AuditFilter;
use crate::domain::model::{
    PlanStatus, Priority, RiskLevel, WorkflowExecution, WorkflowPlan, WorkflowRequest,
};
use crate::utils::error::GuardianError;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateWorkflowBody {
    pub description: String,
    pub user_id: Option<String>,
    pub priority: Option<Priority>,
    pub context: Option<String>,
}

impl CreateWorkflowBody {
    fn into_request(self) -> WorkflowRequest {
        let mut request = WorkflowRequest::new(
            self.description.trim(),
            self.user_id.unwrap_or_else(|| "anonymous".to_string()),
        )
        .with_priority(self.priority.unwrap_or_default());
        request.context = self.context;
        request
    }
}

/// 列表用的精簡資料
#[derive(Serialize)]
struct WorkflowSummary<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    status: PlanStatus,
    progress: u8,
    risk_level: RiskLevel,
    created_at: DateTime<Utc>,
    created_by: &'a str,
    estimated_duration: u32,
    current_step: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl<'a> WorkflowSummary<'a> {
    fn new(plan: &'a WorkflowPlan, execution: Option<&WorkflowExecution>) -> Self {
        let progress = execution.map_or_else(
            || if plan.status == PlanStatus::Completed { 100 } else { 0 },
            |e| e.progress(plan.steps.len()),
        );
        let current_step = execution
            .and_then(|e| plan.steps.get(e.current_step_index))
            .map(|s| s.name.as_str());

        Self {
            id: &plan.id,
            name: &plan.name,
            description: &plan.description,
            status: plan.status,
            progress,
            risk_level: plan.risk_level,
            created_at: plan.created_at,
            created_by: &plan.created_by,
            estimated_duration: plan.estimated_duration,
            current_step,
            completed_at: execution.and_then(|e| e.completed_at),
        }
    }
}

pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowBody>,
) -> ApiResult {
    if body.description.trim().is_empty() {
        return Err(GuardianError::validation("Description is required").into());
    }
    let plan = state.service.create_workflow_plan(body.into_request()).await?;
    ok_with_message("Workflow plan created successfully", plan)
}

pub async fn list_workflows(State(state): State<AppState>) -> ApiResult {
    let plans = state.service.list_plans().await?;
    let executions = state.service.list_executions().await?;

    // 每個計畫只取最新一次執行
    let mut latest: HashMap<&str, &WorkflowExecution> = HashMap::new();
    for execution in &executions {
        let entry = latest.entry(execution.plan_id.as_str()).or_insert(execution);
        if execution.started_at > entry.started_at {
            *entry = execution;
        }
    }

    let summaries: Vec<WorkflowSummary> = plans
        .iter()
        .map(|plan| WorkflowSummary::new(plan, latest.get(plan.id.as_str()).copied()))
        .collect();
    ok_list(&summaries)
}

pub async fn list_templates() -> ApiResult {
    ok_list(&workflow_templates())
}

pub async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let plan = state
        .service
        .get_plan(&id)
        .await?
        .ok_or_else(|| GuardianError::not_found("Workflow", id.as_str()))?;
    let execution = state.service.latest_execution_for(&id).await?;
    let mut log = state
        .service
        .audit()
        .list(&AuditFilter {
            resource_id: Some(id.clone()),
            ..Default::default()
        })
        .await?;
    // 執行紀錄依時間先後
    log.reverse();

    let mut data = serde_json::to_value(&plan)?;
    if let Some(object) = data.as_object_mut() {
        object.insert(
            "progress".to_string(),
            json!(WorkflowSummary::new(&plan, execution.as_ref()).progress),
        );
        object.insert("execution".to_string(), serde_json::to_value(&execution)?);
        object.insert("execution_log".to_string(), serde_json::to_value(&log)?);
    }
    ok(data)
}

pub async fn execute_workflow(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let execution = state.service.start_workflow(&id).await?;
    ok_with_message(
        "Workflow execution started",
        json!({
            "workflow_id": id,
            "execution_id": execution.id,
            "status": "started",
            "started_at": execution.started_at,
        }),
    )
}

pub async fn get_workflow_status(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    ok(state.service.workflow_status(&id).await?)
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> ApiResult {
    let execution = state
        .service
        .get_workflow_execution(&execution_id)
        .await?
        .ok_or_else(|| GuardianError::not_found("Execution", execution_id.as_str()))?;
    ok(execution)
}
