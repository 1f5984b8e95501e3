use crate::domain::model::{RiskAssessment, RiskLevel, WorkflowPlan, WorkflowStep};

/// 整體風險取所有步驟中最高者，沒有步驟時為 low
pub fn overall_risk(steps: &[WorkflowStep]) -> RiskLevel {
    steps
        .iter()
        .map(|step| step.risk_level)
        .max_by_key(RiskLevel::score)
        .unwrap_or(RiskLevel::Low)
}

pub fn total_duration(steps: &[WorkflowStep]) -> u32 {
    steps.iter().map(|step| step.estimated_duration).sum()
}

/// 需要人工核准: 任一步驟要求核准，或整體風險為 high
pub fn requires_approval(steps: &[WorkflowStep]) -> bool {
    steps.iter().any(|step| step.requires_approval) || overall_risk(steps) == RiskLevel::High
}

pub fn assess(plan: &WorkflowPlan) -> RiskAssessment {
    let mut factors = Vec::new();
    let mut mitigation = Vec::new();

    for step in &plan.steps {
        if step.risk_level >= RiskLevel::Medium {
            factors.push(format!(
                "Step {} '{}' is {} risk (tools: {})",
                step.step_order,
                step.name,
                step.risk_level.as_str(),
                step.tool_integrations.join(", ")
            ));
        }
        if step.requires_approval {
            mitigation.push(format!("Human approval checkpoint before '{}'", step.name));
        }
    }

    if !plan.integrations_used.is_empty() {
        factors.push(format!(
            "Touches external systems: {}",
            plan.integrations_used.join(", ")
        ));
    }
    mitigation.push("Every step result is recorded in the audit trail".to_string());
    if plan.risk_level == RiskLevel::High {
        mitigation.push("Execution halts on the first failed step".to_string());
    }

    RiskAssessment {
        level: plan.risk_level,
        factors,
        mitigation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::StepStatus;

    fn step(order: u32, risk: RiskLevel, approval: bool, minutes: u32) -> WorkflowStep {
        WorkflowStep {
            id: format!("step-{}", order),
            plan_id: "plan".to_string(),
            name: format!("Step {}", order),
            description: String::new(),
            step_order: order,
            tool_integrations: vec!["slack".to_string()],
            risk_level: risk,
            requires_approval: approval,
            estimated_duration: minutes,
            status: StepStatus::Pending,
        }
    }

    #[test]
    fn test_overall_risk_is_maximum() {
        let steps = vec![
            step(1, RiskLevel::Low, false, 5),
            step(2, RiskLevel::Medium, true, 20),
            step(3, RiskLevel::Low, false, 5),
        ];
        assert_eq!(overall_risk(&steps), RiskLevel::Medium);
        assert_eq!(total_duration(&steps), 30);
        assert!(requires_approval(&steps));
    }

    #[test]
    fn test_empty_plan_is_low_risk() {
        assert_eq!(overall_risk(&[]), RiskLevel::Low);
        assert_eq!(total_duration(&[]), 0);
        assert!(!requires_approval(&[]));
    }

    #[test]
    fn test_high_risk_requires_approval_without_flag() {
        let steps = vec![step(1, RiskLevel::High, false, 10)];
        assert!(requires_approval(&steps));
    }
}
