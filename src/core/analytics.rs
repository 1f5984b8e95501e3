use crate::core::audit::AuditFilter;
use crate::core::orchestrator::{OrchestrationService, EXECUTOR_ID};
use crate::domain::model::{
    Agent, AgentStatus, ApprovalStatus, AuditEvent, ExecutionStatus, PlanStatus, WorkflowExecution,
    WorkflowPlan,
};
use crate::utils::error::{GuardianError, Result};
use crate::utils::monitor::{ResourceSnapshot, SystemMonitor};
use serde::Serialize;

/// 自動化後人工作業時間的估計倍數
const MANUAL_EFFORT_FACTOR: f64 = 4.0;
const RECENT_ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub cpu: f32,
    pub memory: f32,
    pub memory_mb: u64,
    pub uptime_seconds: u64,
}

impl From<ResourceSnapshot> for Performance {
    fn from(snapshot: ResourceSnapshot) -> Self {
        Self {
            cpu: (snapshot.cpu_usage * 10.0).round() / 10.0,
            memory: (snapshot.memory_usage_percent * 10.0).round() / 10.0,
            memory_mb: snapshot.memory_usage_mb,
            uptime_seconds: snapshot.uptime_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_workflows: usize,
    pub running_workflows: usize,
    /// 已結束執行中成功的百分比
    pub success_rate: f64,
    pub avg_execution_time: String,
    pub time_saved: String,
    pub active_agents: usize,
    pub pending_approvals: usize,
    pub recent_activity: Vec<AuditEvent>,
    pub performance: Performance,
}

impl DashboardData {
    pub fn compute(
        plans: &[WorkflowPlan],
        executions: &[WorkflowExecution],
        agents: &[Agent],
        pending_approvals: usize,
        recent_activity: Vec<AuditEvent>,
        performance: ResourceSnapshot,
    ) -> Self {
        let finished: Vec<&WorkflowExecution> = executions
            .iter()
            .filter(|e| e.status != ExecutionStatus::Running)
            .collect();
        let succeeded = finished
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count();

        let success_rate = if finished.is_empty() {
            0.0
        } else {
            (succeeded as f64 / finished.len() as f64 * 1000.0).round() / 10.0
        };

        let durations: Vec<i64> = finished.iter().filter_map(|e| e.duration_seconds()).collect();
        let avg_seconds = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let automated_minutes: u32 = plans
            .iter()
            .filter(|p| p.status == PlanStatus::Completed)
            .map(|p| p.estimated_duration)
            .sum();
        let saved_hours = automated_minutes as f64 * (MANUAL_EFFORT_FACTOR - 1.0) / 60.0;

        Self {
            total_workflows: plans.len(),
            running_workflows: plans.iter().filter(|p| p.status == PlanStatus::Running).count(),
            success_rate,
            avg_execution_time: format_minutes(avg_seconds),
            time_saved: format!("{:.1}h", saved_hours),
            active_agents: agents
                .iter()
                .filter(|a| matches!(a.status, AgentStatus::Active | AgentStatus::Working))
                .count(),
            pending_approvals,
            recent_activity,
            performance: performance.into(),
        }
    }
}

fn format_minutes(seconds: f64) -> String {
    format!("{:.1}m", seconds / 60.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMetrics {
    pub agent_id: String,
    pub period: String,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub success_rate: f64,
    /// 只有 executor 有執行時間資料
    pub average_execution_time: Option<f64>,
    pub resource_usage: ResourceSnapshot,
}

impl AgentMetrics {
    pub fn compute(agent: &Agent, executions: &[WorkflowExecution], resources: ResourceSnapshot) -> Self {
        let average_execution_time = if agent.id == EXECUTOR_ID {
            let durations: Vec<i64> = executions
                .iter()
                .filter(|e| e.executed_by == agent.id)
                .filter_map(|e| e.duration_seconds())
                .collect();
            (!durations.is_empty())
                .then(|| durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        } else {
            None
        };

        Self {
            agent_id: agent.id.clone(),
            period: "lifetime".to_string(),
            tasks_completed: agent.tasks_completed,
            tasks_failed: agent.tasks_failed,
            success_rate: agent.success_rate(),
            average_execution_time,
            resource_usage: resources,
        }
    }
}

/// 彙整儀表板資料
pub async fn dashboard(service: &OrchestrationService, monitor: &SystemMonitor) -> Result<DashboardData> {
    let plans = service.list_plans().await?;
    let executions = service.list_executions().await?;
    let agents = service.get_all_agents().await?;
    let pending = service.list_approvals(Some(ApprovalStatus::Pending)).await?.len();
    let recent = service
        .audit()
        .list(&AuditFilter {
            limit: Some(RECENT_ACTIVITY_LIMIT),
            ..Default::default()
        })
        .await?;

    Ok(DashboardData::compute(
        &plans,
        &executions,
        &agents,
        pending,
        recent,
        monitor.snapshot().unwrap_or_default(),
    ))
}

pub async fn agent_metrics(
    service: &OrchestrationService,
    monitor: &SystemMonitor,
    agent_id: &str,
) -> Result<AgentMetrics> {
    let agent = service
        .get_agent_status(agent_id)
        .await?
        .ok_or_else(|| GuardianError::not_found("Agent", agent_id))?;
    let executions = service.list_executions().await?;
    Ok(AgentMetrics::compute(
        &agent,
        &executions,
        monitor.snapshot().unwrap_or_default(),
    ))
}
