//! 示範資料：三個範例工作流程、一筆待審核申請與對應的稽核紀錄

use crate::core::orchestrator::{OrchestrationService, AUDITOR_ID, EXECUTOR_ID, PLANNER_ID};
use crate::core::{planner, records, risk};
use crate::domain::model::{
    Approval, ApprovalStatus, AuditEvent, ExecutionStatus, JsonMap, PlanStatus, Priority,
    RiskLevel, StepResult, StepStatus, WorkflowExecution, WorkflowPlan, WorkflowStep,
};
use crate::utils::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// 建立工作流程時可直接套用的範本
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub priority: Priority,
    pub integrations: &'static [&'static str],
    pub estimated_duration: u32,
}

pub fn workflow_templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate {
            id: "template-employee-onboarding",
            name: "Employee Onboarding",
            category: "hr",
            description: "Onboard new software engineer John Doe starting next Monday",
            priority: Priority::High,
            integrations: &["google_workspace", "slack", "jira", "email"],
            estimated_duration: 45,
        },
        WorkflowTemplate {
            id: "template-vendor-onboarding",
            name: "Vendor Onboarding",
            category: "procurement",
            description: "Onboard vendor Acme Corp - tech consulting company with standard compliance requirements",
            priority: Priority::Medium,
            integrations: &["google_workspace", "notion", "email"],
            estimated_duration: 60,
        },
        WorkflowTemplate {
            id: "template-incident-response",
            name: "Incident Response",
            category: "operations",
            description: "Handle critical system outage affecting payment processing",
            priority: Priority::Urgent,
            integrations: &["slack", "jira", "email"],
            estimated_duration: 30,
        },
        WorkflowTemplate {
            id: "template-quarterly-report",
            name: "Quarterly Report Generation",
            category: "finance",
            description: "Automated quarterly business report compilation",
            priority: Priority::Low,
            integrations: &["google_workspace", "email"],
            estimated_duration: 90,
        },
    ]
}

struct DemoStep {
    name: &'static str,
    description: &'static str,
    tools: &'static [&'static str],
    risk: RiskLevel,
    approval: bool,
    minutes: u32,
    status: StepStatus,
}

fn build_plan(
    id: &str,
    name: &str,
    description: &str,
    created_by: &str,
    created_at: DateTime<Utc>,
    status: PlanStatus,
    demo_steps: &[DemoStep],
) -> WorkflowPlan {
    let steps: Vec<WorkflowStep> = demo_steps
        .iter()
        .enumerate()
        .map(|(i, s)| WorkflowStep {
            id: format!("{}-step-{:03}", id, i + 1),
            plan_id: id.to_string(),
            name: s.name.to_string(),
            description: s.description.to_string(),
            step_order: i as u32 + 1,
            tool_integrations: s.tools.iter().map(|t| t.to_string()).collect(),
            risk_level: s.risk,
            requires_approval: s.approval,
            estimated_duration: s.minutes,
            status: s.status,
        })
        .collect();

    let mut metadata = JsonMap::new();
    metadata.insert("demo".to_string(), true.into());

    WorkflowPlan {
        id: id.to_string(),
        request_id: format!("request-{}", id),
        name: name.to_string(),
        description: description.to_string(),
        created_by: created_by.to_string(),
        created_at,
        status,
        risk_level: risk::overall_risk(&steps),
        estimated_duration: risk::total_duration(&steps),
        integrations_used: planner::integrations_used(&steps),
        approval_required: risk::requires_approval(&steps),
        steps,
        summary: Some(description.to_string()),
        metadata,
    }
}

/// 依照計畫中已完成的步驟產生 execution 紀錄
fn build_execution(plan: &WorkflowPlan, started_at: DateTime<Utc>, status: ExecutionStatus) -> WorkflowExecution {
    let mut execution = WorkflowExecution::start(&plan.id, EXECUTOR_ID);
    execution.id = format!("execution-{}", plan.id);
    execution.started_at = started_at;
    execution.status = status;

    let mut clock = started_at;
    for (index, step) in plan.steps.iter().enumerate() {
        if step.status == StepStatus::Pending {
            break;
        }
        execution.current_step_index = index;
        if step.status != StepStatus::Completed {
            continue;
        }
        let finished = clock + Duration::minutes(step.estimated_duration as i64);
        execution.step_results.insert(
            step.id.clone(),
            StepResult {
                status: StepStatus::Completed,
                started_at: clock,
                completed_at: Some(finished),
                failed_at: None,
                output: Some(format!("Successfully completed {}", step.name)),
                error: None,
                tools_used: step.tool_integrations.clone(),
            },
        );
        clock = finished;
    }

    if status == ExecutionStatus::Completed {
        execution.completed_at = Some(clock);
    }
    execution
}

/// 寫入示範資料；已存在時略過
pub async fn seed_demo_data(service: &OrchestrationService) -> Result<()> {
    let store = service.store().as_ref();
    if store.get_json(&records::plan_key("workflow-001")).await?.is_some() {
        tracing::debug!("Demo data already present, skipping seed");
        return Ok(());
    }

    tracing::info!("🧪 Seeding demo workflows");
    let now = Utc::now();

    let onboarding = build_plan(
        "workflow-001",
        "Employee Onboarding - John Doe",
        "Complete onboarding process for new software engineer",
        "hr-manager",
        now - Duration::minutes(40),
        PlanStatus::Running,
        &[
            DemoStep {
                name: "Create Email Account",
                description: "Set up corporate email account",
                tools: &["google_workspace"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 15,
                status: StepStatus::Completed,
            },
            DemoStep {
                name: "Setup Slack Access",
                description: "Add to company Slack workspace",
                tools: &["slack"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 10,
                status: StepStatus::Completed,
            },
            DemoStep {
                name: "Development Environment",
                description: "Configure development tools and access",
                tools: &["github", "jira"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 20,
                status: StepStatus::Running,
            },
            DemoStep {
                name: "Send Welcome Package",
                description: "Email welcome materials and first-day schedule",
                tools: &["email"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 5,
                status: StepStatus::Pending,
            },
        ],
    );

    let vendor = build_plan(
        "workflow-002",
        "Vendor Onboarding - Acme Corp",
        "Onboard new technology vendor with compliance checks",
        "procurement-lead",
        now - Duration::minutes(25),
        PlanStatus::PendingApproval,
        &[
            DemoStep {
                name: "Collect Vendor Documents",
                description: "Request W-9, insurance certificates and security questionnaire",
                tools: &["email"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 15,
                status: StepStatus::Pending,
            },
            DemoStep {
                name: "Security Review",
                description: "Grant vendor access to shared workspace after security sign-off",
                tools: &["google_workspace", "notion"],
                risk: RiskLevel::Medium,
                approval: true,
                minutes: 30,
                status: StepStatus::Pending,
            },
            DemoStep {
                name: "Register Vendor",
                description: "Create vendor record and notify procurement",
                tools: &["jira", "slack"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 10,
                status: StepStatus::Pending,
            },
        ],
    );

    let report = build_plan(
        "workflow-003",
        "Quarterly Report Generation",
        "Automated quarterly business report compilation",
        "finance-team",
        now - Duration::hours(4),
        PlanStatus::Completed,
        &[
            DemoStep {
                name: "Gather Financial Data",
                description: "Pull quarterly figures from shared sheets",
                tools: &["google_workspace"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 30,
                status: StepStatus::Completed,
            },
            DemoStep {
                name: "Compile Report",
                description: "Assemble the quarterly report document",
                tools: &["google_workspace"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 45,
                status: StepStatus::Completed,
            },
            DemoStep {
                name: "Deliver Report",
                description: "Email the report to leadership",
                tools: &["email"],
                risk: RiskLevel::Low,
                approval: false,
                minutes: 15,
                status: StepStatus::Completed,
            },
        ],
    );

    let executions = [
        build_execution(&onboarding, onboarding.created_at, ExecutionStatus::Running),
        build_execution(&report, report.created_at, ExecutionStatus::Completed),
    ];

    let approval = Approval {
        id: "approval-001".to_string(),
        workflow_id: vendor.id.clone(),
        workflow_name: vendor.name.clone(),
        requested_by: vendor.created_by.clone(),
        request_date: vendor.created_at,
        status: ApprovalStatus::Pending,
        priority: Priority::Medium,
        risk_assessment: risk::assess(&vendor),
        steps_requiring_approval: vendor
            .steps
            .iter()
            .filter(|s| s.requires_approval)
            .cloned()
            .collect(),
        decided_by: None,
        decided_at: None,
        reason: None,
    };

    for plan in [&onboarding, &vendor, &report] {
        records::save(store, &records::plan_key(&plan.id), plan).await?;
    }
    for execution in &executions {
        records::save(store, &records::execution_key(&execution.id), execution).await?;
    }
    records::save(store, &records::approval_key(&approval.id), &approval).await?;

    let events = [
        AuditEvent::new("workflow_started", "Employee onboarding workflow initiated")
            .with_user("hr-manager")
            .with_resource("workflow-001"),
        AuditEvent::new("step_completed", "Email account created successfully")
            .with_user(EXECUTOR_ID)
            .with_resource("workflow-001"),
        AuditEvent::new("approval_requested", "Security approval requested for Acme Corp")
            .with_user("procurement-lead")
            .with_resource("workflow-002"),
        AuditEvent::new("workflow_completed", "Quarterly report delivered")
            .with_user(EXECUTOR_ID)
            .with_resource("workflow-003"),
    ];
    for (offset, mut event) in events.into_iter().enumerate() {
        event.timestamp = now - Duration::minutes(30 - offset as i64 * 5);
        service.audit().record(event).await?;
    }

    for (agent_id, completed, failed) in [(PLANNER_ID, 156, 2), (EXECUTOR_ID, 143, 5), (AUDITOR_ID, 892, 1)] {
        service
            .update_agent(agent_id, |agent| {
                agent.tasks_completed += completed;
                agent.tasks_failed += failed;
            })
            .await?;
    }

    Ok(())
}
