use crate::domain::model::WorkflowStep;
use crate::domain::ports::StepRunner;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 以 sleep 模擬外部整合呼叫
#[derive(Debug, Clone)]
pub struct SimulatedStepRunner {
    delay: Duration,
}

impl SimulatedStepRunner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedStepRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl StepRunner for SimulatedStepRunner {
    async fn run_step(&self, step: &WorkflowStep) -> Result<String> {
        tokio::time::sleep(self.delay).await;

        tracing::info!(
            "Simulated execution of step: {} using tools: {:?}",
            step.name,
            step.tool_integrations
        );
        Ok(format!("Successfully completed {}", step.name))
    }
}
