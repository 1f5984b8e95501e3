use crate::core::risk;
use crate::domain::model::{
    JsonMap, PlanStatus, RiskLevel, StepStatus, WorkflowPlan, WorkflowRequest, WorkflowStep,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;

/// 不算外部整合的工具
const INTERNAL_TOOLS: &[&str] = &["internal", "audit"];

pub const PLANNER_SYSTEM_PROMPT: &str =
    "You are the Planner Agent in OpsFlow Guardian. Reply with a single JSON object and no prose.";

pub fn planning_prompt(request: &WorkflowRequest) -> String {
    format!(
        r#"Create a detailed, actionable workflow plan for the following request:

REQUEST: {description}

CONTEXT:
- User: {user}
- Priority: {priority}
- Additional Context: {context}

REQUIREMENTS:
1. Break down the request into specific, actionable steps
2. Identify which external tools/services need to be integrated
3. Assess risks for each step (low, medium, high)
4. Specify approval requirements for high-risk actions
5. Estimate execution time for each step in minutes
6. Include error handling and rollback procedures

AVAILABLE INTEGRATIONS:
- google_workspace (Gmail, Sheets, Drive, Calendar)
- slack (messaging, notifications)
- notion (workspace creation, documentation)
- jira (ticket management, project tracking)
- email (notifications, communications)

OUTPUT FORMAT (JSON):
{{
  "plan_summary": "executive summary",
  "overall_risk": "low|medium|high",
  "steps": [
    {{
      "name": "step name",
      "description": "what the step does and its success criteria",
      "tool_integrations": ["slack"],
      "risk_level": "low|medium|high",
      "requires_approval": false,
      "estimated_duration": 5
    }}
  ],
  "rollback_procedures": ["..."]
}}

Be specific and actionable. Consider error scenarios and provide contingency plans."#,
        description = request.description,
        user = request.user_id,
        priority = request.priority.as_str(),
        context = request.context.as_deref().unwrap_or("None provided"),
    )
}

/// 計畫名稱: "Workflow: " + 描述前 50 個字元 + "..."
pub fn plan_name(description: &str) -> String {
    let head: String = description.chars().take(50).collect();
    format!("Workflow: {}...", head)
}

const JSON_FENCE: &str = "```json";

/// 取出 LLM 回應中的計畫 JSON，先看 ```json 區塊，再看整段文字
fn extract_json_object(content: &str) -> Option<Value> {
    fenced_block(content)
        .and_then(first_plan_object)
        .or_else(|| first_plan_object(content))
}

fn fenced_block(content: &str) -> Option<&str> {
    let start = content.find(JSON_FENCE)? + JSON_FENCE.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// 從每個 `{` 起點嘗試解析，優先回傳帶有 `steps` 的物件
fn first_plan_object(text: &str) -> Option<Value> {
    let mut first_object = None;
    for (offset, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[offset..]).into_iter::<Value>();
        let Some(Ok(value)) = stream.next() else {
            continue;
        };
        if value.get("steps").is_some() {
            return Some(value);
        }
        if first_object.is_none() && value.is_object() {
            first_object = Some(value);
        }
    }
    first_object
}

fn parse_step(raw: &Value, plan_id: &str, order: u32) -> Option<WorkflowStep> {
    let name = raw.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let tool_integrations = raw
        .get("tool_integrations")
        .or_else(|| raw.get("tools"))
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(Value::as_str)
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_else(|| vec!["internal".to_string()]);

    let risk_level = raw
        .get("risk_level")
        .and_then(Value::as_str)
        .map(RiskLevel::parse_lenient)
        .unwrap_or(RiskLevel::Low);

    let requires_approval = match raw.get("requires_approval") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(text.to_ascii_lowercase().as_str(), "yes" | "true"),
        _ => risk_level == RiskLevel::High,
    };

    let estimated_duration = raw
        .get("estimated_duration")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.round().max(0.0) as u64)))
        .unwrap_or(5)
        .min(u32::MAX as u64) as u32;

    Some(WorkflowStep {
        id: format!("step-{}", uuid::Uuid::new_v4()),
        plan_id: plan_id.to_string(),
        name: name.to_string(),
        description: raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        step_order: order,
        tool_integrations,
        risk_level,
        requires_approval,
        estimated_duration,
        status: StepStatus::Pending,
    })
}

/// LLM 沒有給出可用步驟時使用的三段式預設流程
pub fn default_steps(plan_id: &str) -> Vec<WorkflowStep> {
    let templates: [(&str, &str, &[&str], RiskLevel, bool, u32); 3] = [
        (
            "Initialize Workflow",
            "Set up initial parameters and validate inputs",
            &["internal"],
            RiskLevel::Low,
            false,
            5,
        ),
        (
            "Execute Main Task",
            "Perform the primary workflow actions",
            &["google_workspace", "slack"],
            RiskLevel::Medium,
            true,
            20,
        ),
        (
            "Finalize and Report",
            "Complete workflow and send notifications",
            &["email", "audit"],
            RiskLevel::Low,
            false,
            5,
        ),
    ];

    templates
        .iter()
        .enumerate()
        .map(|(i, (name, description, tools, risk, approval, minutes))| WorkflowStep {
            id: format!("step-{}", uuid::Uuid::new_v4()),
            plan_id: plan_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            step_order: i as u32 + 1,
            tool_integrations: tools.iter().map(|t| t.to_string()).collect(),
            risk_level: *risk,
            requires_approval: *approval,
            estimated_duration: *minutes,
            status: StepStatus::Pending,
        })
        .collect()
}

pub fn integrations_used(steps: &[WorkflowStep]) -> Vec<String> {
    let tools: BTreeSet<&str> = steps
        .iter()
        .flat_map(|step| step.tool_integrations.iter().map(String::as_str))
        .filter(|tool| !INTERNAL_TOOLS.contains(tool))
        .collect();
    tools.into_iter().map(str::to_string).collect()
}

/// 將 LLM 輸出整理成 WorkflowPlan
pub fn parse_plan(
    content: &str,
    request: &WorkflowRequest,
    provider: &str,
    model: &str,
    max_steps: usize,
) -> WorkflowPlan {
    let plan_id = uuid::Uuid::new_v4().to_string();
    let parsed = extract_json_object(content);

    let mut steps: Vec<WorkflowStep> = parsed
        .as_ref()
        .and_then(|v| v.get("steps"))
        .and_then(Value::as_array)
        .map(|raw_steps| {
            raw_steps
                .iter()
                .enumerate()
                .filter_map(|(i, raw)| parse_step(raw, &plan_id, i as u32 + 1))
                .take(max_steps)
                .collect()
        })
        .unwrap_or_default();

    let parsed_from_model = !steps.is_empty();
    if !parsed_from_model {
        tracing::warn!("⚠️ Planner output had no usable steps, using default plan layout");
        steps = default_steps(&plan_id);
    }
    // 重新編號，確保 step_order 連續
    for (i, step) in steps.iter_mut().enumerate() {
        step.step_order = i as u32 + 1;
    }

    let summary = parsed
        .as_ref()
        .and_then(|v| v.get("plan_summary").or_else(|| v.get("summary")))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut metadata = JsonMap::new();
    metadata.insert("llm_provider".to_string(), Value::from(provider));
    metadata.insert("llm_model".to_string(), Value::from(model));
    metadata.insert("parsed_from_model".to_string(), Value::from(parsed_from_model));
    if let Ok(original) = serde_json::to_value(request) {
        metadata.insert("original_request".to_string(), original);
    }
    if let Some(rollback) = parsed.as_ref().and_then(|v| v.get("rollback_procedures")) {
        metadata.insert("rollback_procedures".to_string(), rollback.clone());
    }

    let risk_level = risk::overall_risk(&steps);
    let approval_required = risk::requires_approval(&steps);

    WorkflowPlan {
        id: plan_id,
        request_id: request.id.clone(),
        name: plan_name(&request.description),
        description: request.description.clone(),
        created_by: request.user_id.clone(),
        created_at: Utc::now(),
        status: PlanStatus::PendingApproval,
        risk_level,
        estimated_duration: risk::total_duration(&steps),
        integrations_used: integrations_used(&steps),
        approval_required,
        steps,
        summary,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WorkflowRequest {
        WorkflowRequest::new("Create onboarding for a new software engineer", "hr-manager")
            .with_context("Starts Monday")
    }

    #[test]
    fn test_prompt_includes_request_details() {
        let prompt = planning_prompt(&request());
        assert!(prompt.contains("REQUEST: Create onboarding for a new software engineer"));
        assert!(prompt.contains("- User: hr-manager"));
        assert!(prompt.contains("- Priority: medium"));
        assert!(prompt.contains("- Additional Context: Starts Monday"));
    }

    #[test]
    fn test_plan_name_truncates_to_fifty_chars() {
        let description = "x".repeat(80);
        assert_eq!(plan_name(&description), format!("Workflow: {}...", "x".repeat(50)));
        assert_eq!(plan_name("short"), "Workflow: short...");
    }

    #[test]
    fn test_parse_fenced_json_plan() {
        let content = r#"Here is the plan:
```json
{
  "plan_summary": "Provision accounts",
  "steps": [
    {"name": "Create Email Account", "tool_integrations": ["google_workspace"], "risk_level": "low", "estimated_duration": 15},
    {"name": "Grant Admin Rights", "tool_integrations": ["jira"], "risk_level": "HIGH", "estimated_duration": 10.4},
    {"name": "   "}
  ],
  "rollback_procedures": ["Remove accounts"]
}
```"#;

        let plan = parse_plan(content, &request(), "google", "gemini-1.5-flash", 10);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].step_order, 2);
        assert!(plan.steps[1].requires_approval);
        assert_eq!(plan.steps[1].estimated_duration, 10);
        assert_eq!(plan.risk_level, RiskLevel::High);
        assert!(plan.approval_required);
        assert_eq!(plan.estimated_duration, 25);
        assert_eq!(plan.summary.as_deref(), Some("Provision accounts"));
        assert_eq!(plan.integrations_used, vec!["google_workspace", "jira"]);
        assert_eq!(plan.metadata["parsed_from_model"], true);
        assert_eq!(plan.status, PlanStatus::PendingApproval);
        assert!(plan.steps.iter().all(|s| s.plan_id == plan.id));
    }

    #[test]
    fn test_unstructured_output_uses_default_steps() {
        let plan = parse_plan("1. Do things\n2. More things", &request(), "google", "m", 10);

        let names: Vec<&str> = plan.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Initialize Workflow", "Execute Main Task", "Finalize and Report"]);
        assert_eq!(plan.risk_level, RiskLevel::Medium);
        assert_eq!(plan.estimated_duration, 30);
        assert_eq!(plan.integrations_used, vec!["email", "google_workspace", "slack"]);
        assert_eq!(plan.metadata["parsed_from_model"], false);
    }

    #[test]
    fn test_max_steps_cap() {
        let steps: Vec<Value> = (0..8)
            .map(|i| serde_json::json!({"name": format!("Step {}", i)}))
            .collect();
        let content = serde_json::json!({ "steps": steps }).to_string();

        let plan = parse_plan(&content, &request(), "offline", "m", 3);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert!(!plan.approval_required);
    }

    #[test]
    fn test_braces_in_surrounding_prose() {
        let content = "Here is the plan {v2}:\n```json\n{\"steps\":[{\"name\":\"Create Account\",\"risk_level\":\"low\"}]}\n```\nLet me know {if} anything changes.";
        let plan = parse_plan(content, &request(), "google", "m", 10);

        let names: Vec<&str> = plan.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Create Account"]);
        assert_eq!(plan.metadata["parsed_from_model"], true);
    }

    #[test]
    fn test_unfenced_plan_after_prose_with_braces() {
        let content = r#"Template {name} filled in. Plan: {"plan_summary": "Notify", "steps": [{"name": "Send Slack Message", "tool_integrations": ["slack"]}]} Done."#;
        let plan = parse_plan(content, &request(), "openai", "m", 10);

        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].name, "Send Slack Message");
        assert_eq!(plan.summary.as_deref(), Some("Notify"));
    }

    #[test]
    fn test_blank_steps_do_not_count_toward_cap() {
        let content = serde_json::json!({
            "steps": [
                {"name": ""},
                {"name": "  "},
                {"name": "Open Ticket"},
                {"name": "Assign Owner"},
                {"name": "Close Ticket"}
            ]
        })
        .to_string();

        let plan = parse_plan(&content, &request(), "offline", "m", 2);
        let names: Vec<&str> = plan.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Open Ticket", "Assign Owner"]);
        assert_eq!(plan.steps[1].step_order, 2);
    }
}
