use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Executor,
    Auditor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Working,
    Error,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub description: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub config: JsonMap,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub tasks_completed: u64,
    #[serde(default)]
    pub tasks_failed: u64,
    pub last_active: DateTime<Utc>,
}

impl Agent {
    /// 成功率 (百分比)，沒有任務時視為 100
    pub fn success_rate(&self) -> f64 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            return 100.0;
        }
        let rate = self.tasks_completed as f64 / total as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }

    pub fn begin_task(&mut self, task: impl Into<String>) {
        self.status = AgentStatus::Working;
        self.current_task = Some(task.into());
        self.last_active = Utc::now();
    }

    pub fn finish_task(&mut self, succeeded: bool) {
        if succeeded {
            self.tasks_completed += 1;
            self.status = AgentStatus::Active;
        } else {
            self.tasks_failed += 1;
            self.status = AgentStatus::Error;
        }
        self.current_task = None;
        self.last_active = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn score(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// 寬鬆解析 LLM 輸出，未知值當作 low
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => Self::High,
            "medium" | "moderate" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

fn default_user() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub id: String,
    pub description: String,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub context: Option<String>,
}

impl WorkflowRequest {
    pub fn new(description: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            user_id: user_id.into(),
            priority: Priority::default(),
            context: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub plan_id: String,
    pub name: String,
    pub description: String,
    pub step_order: u32,
    pub tool_integrations: Vec<String>,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    /// 預估時間 (分鐘)
    pub estimated_duration: u32,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    PendingApproval,
    Approved,
    Rejected,
    Running,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub id: String,
    pub request_id: String,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub status: PlanStatus,
    pub risk_level: RiskLevel,
    pub estimated_duration: u32,
    pub steps: Vec<WorkflowStep>,
    pub approval_required: bool,
    pub integrations_used: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub executed_by: String,
    pub current_step_index: usize,
    /// step id -> 結果
    #[serde(default)]
    pub step_results: BTreeMap<String, StepResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl WorkflowExecution {
    pub fn start(plan_id: &str, executed_by: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            executed_by: executed_by.to_string(),
            current_step_index: 0,
            step_results: BTreeMap::new(),
            error_message: None,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.step_results
            .values()
            .filter(|r| r.status == StepStatus::Completed)
            .count()
    }

    /// 完成百分比 (0-100)
    pub fn progress(&self, total_steps: usize) -> u8 {
        if total_steps == 0 {
            return if self.status == ExecutionStatus::Completed { 100 } else { 0 };
        }
        let done = self.completed_steps().min(total_steps);
        ((done * 100) / total_steps) as u8
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_seconds().max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub mitigation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub requested_by: String,
    pub request_date: DateTime<Utc>,
    pub status: ApprovalStatus,
    pub priority: Priority,
    pub risk_assessment: RiskAssessment,
    pub steps_requiring_approval: Vec<WorkflowStep>,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Violation,
    Warning,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::Violation => "violation",
            Self::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub details: JsonMap,
    pub compliance_status: ComplianceStatus,
}

impl AuditEvent {
    pub fn new(event_type: &str, action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            severity: Severity::Info,
            user_id: None,
            resource_id: None,
            action: action.into(),
            details: JsonMap::new(),
            compliance_status: ComplianceStatus::Compliant,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        if severity >= Severity::Error {
            self.compliance_status = ComplianceStatus::Warning;
        }
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_compliance(mut self, status: ComplianceStatus) -> Self {
        self.compliance_status = status;
        self
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let rank = |s: &Severity| match s {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Error => 2,
            Severity::Critical => 3,
        };
        rank(self).cmp(&rank(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent {
            id: "planner-001".to_string(),
            name: "Workflow Planner".to_string(),
            role: AgentRole::Planner,
            status: AgentStatus::Active,
            description: String::new(),
            capabilities: vec![],
            config: JsonMap::new(),
            current_task: None,
            tasks_completed: 0,
            tasks_failed: 0,
            last_active: Utc::now(),
        }
    }

    #[test]
    fn test_agent_task_lifecycle() {
        let mut agent = agent();
        assert_eq!(agent.success_rate(), 100.0);

        agent.begin_task("plan-1");
        assert_eq!(agent.status, AgentStatus::Working);
        assert_eq!(agent.current_task.as_deref(), Some("plan-1"));

        agent.finish_task(true);
        agent.begin_task("plan-2");
        agent.finish_task(false);
        assert_eq!(agent.status, AgentStatus::Error);
        assert!(agent.current_task.is_none());
        assert_eq!(agent.success_rate(), 50.0);
    }

    #[test]
    fn test_wire_format_is_snake_case() {
        let value = serde_json::to_value(PlanStatus::PendingApproval).unwrap();
        assert_eq!(value, "pending_approval");
        assert_eq!(serde_json::to_value(AgentRole::Auditor).unwrap(), "auditor");
        assert_eq!(RiskLevel::parse_lenient(" HIGH "), RiskLevel::High);
        assert_eq!(RiskLevel::parse_lenient("unknown"), RiskLevel::Low);
    }

    #[test]
    fn test_request_defaults() {
        let request: WorkflowRequest =
            serde_json::from_str(r#"{"id": "r1", "description": "Onboard vendor"}"#).unwrap();
        assert_eq!(request.user_id, "anonymous");
        assert_eq!(request.priority, Priority::Medium);
    }

    #[test]
    fn test_audit_event_error_severity_flags_compliance() {
        let event = AuditEvent::new("workflow_failed", "Execution failed").with_severity(Severity::Error);
        assert_eq!(event.compliance_status, ComplianceStatus::Warning);
    }
}
