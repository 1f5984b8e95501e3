use httpmock::prelude::*;
use opsflow_guardian::config::LlmProviderKind;
use opsflow_guardian::domain::model::{
    ApprovalStatus, ExecutionStatus, PlanStatus, RiskLevel, WorkflowRequest,
};
use opsflow_guardian::{GuardianError, OrchestrationService, Settings};
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

fn gemini_plan_response() -> serde_json::Value {
    let plan = json!({
        "plan_summary": "Handle payment outage",
        "overall_risk": "high",
        "steps": [
            {
                "name": "Page On-Call Engineer",
                "description": "Notify the on-call rotation",
                "tool_integrations": ["slack"],
                "risk_level": "low",
                "requires_approval": false,
                "estimated_duration": 2
            },
            {
                "name": "Fail Over Payment Gateway",
                "description": "Switch traffic to the standby gateway",
                "tool_integrations": ["jira"],
                "risk_level": "high",
                "estimated_duration": 10
            },
            {
                "name": "Notify Customers",
                "tool_integrations": ["email"],
                "risk_level": "medium",
                "requires_approval": "no",
                "estimated_duration": 5
            }
        ],
        "rollback_procedures": ["Switch traffic back to the primary gateway"]
    });

    json!({
        "candidates": [{
            "content": {"parts": [{"text": format!("```json\n{}\n```", plan)}]}
        }],
        "usageMetadata": {"totalTokenCount": 321}
    })
}

fn settings_file(server: &MockServer) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[llm]
provider = "google"
model = "gemini-test"
google_api_key = "test-key"
base_url = "{}"
timeout_seconds = 5

[workflow]
step_delay_ms = 1
seed_demo_data = false
max_workflow_steps = 5
"#,
        server.base_url()
    )
    .unwrap();
    file
}

#[tokio::test]
async fn test_plan_approve_execute_with_gemini() {
    let server = MockServer::start();
    let gemini = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-test:generateContent")
            .header("x-goog-api-key", "test-key")
            .body_contains("Handle critical system outage");
        then.status(200).json_body(gemini_plan_response());
    });

    let file = settings_file(&server);
    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.llm.provider, LlmProviderKind::Google);

    let service = OrchestrationService::from_settings(&settings).await.unwrap();

    let request = WorkflowRequest::new(
        "Handle critical system outage affecting payment processing",
        "demo-user",
    )
    .with_context("P1 incident requiring immediate response");
    let plan = service.create_workflow_plan(request).await.unwrap();
    gemini.assert();

    assert_eq!(plan.steps.len(), 3);
    assert_eq!(plan.risk_level, RiskLevel::High);
    assert_eq!(plan.estimated_duration, 17);
    assert!(plan.steps[1].requires_approval);
    assert!(!plan.steps[2].requires_approval);
    assert_eq!(plan.integrations_used, vec!["email", "jira", "slack"]);
    assert_eq!(plan.summary.as_deref(), Some("Handle payment outage"));
    assert_eq!(plan.metadata["llm_provider"], "google");
    assert_eq!(plan.metadata["llm_model"], "gemini-test");
    assert_eq!(plan.metadata["tokens_used"], 321);

    let approvals = service.list_approvals(Some(ApprovalStatus::Pending)).await.unwrap();
    assert_eq!(approvals.len(), 1);
    let approval = &approvals[0];
    assert_eq!(approval.risk_assessment.level, RiskLevel::High);
    assert_eq!(approval.steps_requiring_approval.len(), 1);
    assert!(approval
        .risk_assessment
        .factors
        .iter()
        .any(|f| f.contains("Fail Over Payment Gateway")));

    service.approve(&approval.id, "incident-commander").await.unwrap();
    let execution = service.execute_workflow(&plan.id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.completed_steps(), 3);

    let stored = service.get_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Completed);

    // 已完成的計畫可以再執行一次
    let rerun = service.execute_workflow(&plan.id).await.unwrap();
    assert_ne!(rerun.id, execution.id);
    let latest = service.latest_execution_for(&plan.id).await.unwrap().unwrap();
    assert_eq!(latest.id, rerun.id);
}

#[tokio::test]
async fn test_provider_error_leaves_planner_in_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1beta/models/gemini-test:generateContent");
        then.status(429).body("quota exceeded");
    });

    let file = settings_file(&server);
    let settings = Settings::from_file(file.path()).unwrap();
    let service = OrchestrationService::from_settings(&settings).await.unwrap();

    let err = service
        .create_workflow_plan(WorkflowRequest::new("Send weekly digest", "ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardianError::LlmError { .. }));

    let planner = service.get_agent_status("planner-001").await.unwrap().unwrap();
    assert_eq!(planner.tasks_failed, 1);
    assert!(planner.current_task.is_none());

    let events = service.audit().list(&Default::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "plan_generation_failed");
}
