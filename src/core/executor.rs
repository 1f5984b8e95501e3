use crate::core::records;
use crate::domain::model::{
    ExecutionStatus, JsonMap, StepResult, StepStatus, WorkflowExecution, WorkflowPlan,
};
use crate::domain::ports::{KeyValueStore, StepRunner};
use crate::utils::error::{GuardianError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// 依序執行計畫步驟，每一步完成後把進度寫回儲存
pub struct WorkflowExecutor {
    store: Arc<dyn KeyValueStore>,
    runner: Arc<dyn StepRunner>,
    time_limit: Option<Duration>,
}

impl WorkflowExecutor {
    pub fn new(store: Arc<dyn KeyValueStore>, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            store,
            runner,
            time_limit: None,
        }
    }

    /// 整個執行的時間上限
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// 執行所有步驟；任何步驟失敗即停止，execution 標記為 failed 並回傳錯誤
    pub async fn run(&self, plan: &mut WorkflowPlan, execution: &mut WorkflowExecution) -> Result<()> {
        records::save(self.store.as_ref(), &records::execution_key(&execution.id), &*execution).await?;

        let outcome = match self.time_limit {
            Some(limit) => match tokio::time::timeout(limit, self.run_steps(plan, execution)).await {
                Ok(result) => result,
                Err(_) => Err(GuardianError::ExecutionTimeout {
                    minutes: limit.as_secs() / 60,
                }),
            },
            None => self.run_steps(plan, execution).await,
        };

        match outcome {
            Ok(()) => {
                execution.status = ExecutionStatus::Completed;
                execution.completed_at = Some(Utc::now());
                records::save(self.store.as_ref(), &records::execution_key(&execution.id), &*execution)
                    .await?;
                tracing::info!("✅ Completed execution of workflow {}", execution.id);
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ Failed to execute workflow {}: {}", execution.id, e);
                execution.status = ExecutionStatus::Failed;
                execution.completed_at = Some(Utc::now());
                execution.error_message = Some(e.to_string());
                // 中斷時仍在執行中的步驟標記為失敗
                for step in plan.steps.iter_mut().filter(|s| s.status == StepStatus::Running) {
                    step.status = StepStatus::Failed;
                }
                if let Err(store_err) =
                    records::save(self.store.as_ref(), &records::execution_key(&execution.id), &*execution)
                        .await
                {
                    tracing::error!("❌ Could not persist failed execution {}: {}", execution.id, store_err);
                }
                Err(e)
            }
        }
    }

    async fn run_steps(&self, plan: &mut WorkflowPlan, execution: &mut WorkflowExecution) -> Result<()> {
        for (index, step) in plan.steps.iter_mut().enumerate() {
            execution.current_step_index = index;
            step.status = StepStatus::Running;
            tracing::info!("Executing step {} for workflow {}", step.name, execution.id);

            let started_at = Utc::now();
            match self.runner.run_step(step).await {
                Ok(output) => {
                    step.status = StepStatus::Completed;
                    execution.step_results.insert(
                        step.id.clone(),
                        StepResult {
                            status: StepStatus::Completed,
                            started_at,
                            completed_at: Some(Utc::now()),
                            failed_at: None,
                            output: Some(output),
                            error: None,
                            tools_used: step.tool_integrations.clone(),
                        },
                    );
                }
                Err(e) => {
                    tracing::error!("❌ Failed to execute step {}: {}", step.name, e);
                    step.status = StepStatus::Failed;
                    execution.step_results.insert(
                        step.id.clone(),
                        StepResult {
                            status: StepStatus::Failed,
                            started_at,
                            completed_at: None,
                            failed_at: Some(Utc::now()),
                            output: None,
                            error: Some(e.to_string()),
                            tools_used: step.tool_integrations.clone(),
                        },
                    );
                    return Err(GuardianError::ExecutionError {
                        step: step.name.clone(),
                        details: e.to_string(),
                    });
                }
            }

            // 更新進度
            records::save(self.store.as_ref(), &records::execution_key(&execution.id), &*execution).await?;
        }
        Ok(())
    }

    /// 執行摘要
    pub fn execution_summary(plan: &WorkflowPlan, execution: &WorkflowExecution) -> JsonMap {
        let mut summary = JsonMap::new();
        let total_steps = plan.steps.len();

        summary.insert("total_steps".to_string(), total_steps.into());
        summary.insert("completed_steps".to_string(), execution.completed_steps().into());
        summary.insert("progress".to_string(), execution.progress(total_steps).into());
        summary.insert(
            "current_step".to_string(),
            plan.steps
                .get(execution.current_step_index)
                .map(|s| serde_json::Value::from(s.name.clone()))
                .unwrap_or(serde_json::Value::Null),
        );

        let remaining: u32 = plan
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Pending | StepStatus::Running))
            .map(|s| s.estimated_duration)
            .sum();
        summary.insert(
            "estimated_time_remaining".to_string(),
            format!("{} minutes", remaining).into(),
        );
        if let Some(seconds) = execution.duration_seconds() {
            summary.insert("total_duration_seconds".to_string(), seconds.into());
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStore;
    use crate::core::planner;
    use crate::domain::model::{WorkflowRequest, WorkflowStep};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRunner {
        fail_on: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new(fail_on: Option<&str>) -> Self {
            Self {
                fail_on: fail_on.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run_step(&self, step: &WorkflowStep) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(step.name.as_str()) {
                return Err(GuardianError::StorageError {
                    message: "slack webhook rejected".to_string(),
                });
            }
            Ok(format!("Successfully completed {}", step.name))
        }
    }

    struct SlowRunner;

    #[async_trait]
    impl StepRunner for SlowRunner {
        async fn run_step(&self, _step: &WorkflowStep) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    fn plan() -> WorkflowPlan {
        let request = WorkflowRequest::new("Quarterly report", "finance-team");
        planner::parse_plan("", &request, "offline", "m", 10)
    }

    #[tokio::test]
    async fn test_all_steps_complete() {
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(ScriptedRunner::new(None));
        let executor = WorkflowExecutor::new(store.clone(), runner.clone());

        let mut plan = plan();
        let mut execution = WorkflowExecution::start(&plan.id, "executor-001");
        executor.run(&mut plan, &mut execution).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.current_step_index, 2);
        assert_eq!(execution.step_results.len(), 3);
        assert_eq!(execution.progress(plan.steps.len()), 100);
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);

        let stored: WorkflowExecution =
            records::load(store.as_ref(), &records::execution_key(&execution.id))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);

        let summary = WorkflowExecutor::execution_summary(&plan, &execution);
        assert_eq!(summary["completed_steps"], 3);
        assert_eq!(summary["estimated_time_remaining"], "0 minutes");
    }

    #[tokio::test]
    async fn test_failure_stops_execution() {
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(ScriptedRunner::new(Some("Execute Main Task")));
        let executor = WorkflowExecutor::new(store.clone(), runner.clone());

        let mut plan = plan();
        let mut execution = WorkflowExecution::start(&plan.id, "executor-001");
        let err = executor.run(&mut plan, &mut execution).await.unwrap_err();

        assert!(matches!(err, GuardianError::ExecutionError { ref step, .. } if step == "Execute Main Task"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.current_step_index, 1);
        assert!(execution.error_message.as_deref().unwrap().contains("slack webhook rejected"));

        let failed = &execution.step_results[&plan.steps[1].id];
        assert_eq!(failed.status, StepStatus::Failed);
        assert!(failed.failed_at.is_some());
        assert_eq!(plan.steps[2].status, StepStatus::Pending);

        let stored: WorkflowExecution =
            records::load(store.as_ref(), &records::execution_key(&execution.id))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_time_limit() {
        let store = Arc::new(MemoryStore::new());
        let executor = WorkflowExecutor::new(store, Arc::new(SlowRunner))
            .with_time_limit(Duration::from_millis(20));

        let mut plan = plan();
        let mut execution = WorkflowExecution::start(&plan.id, "executor-001");
        let err = executor.run(&mut plan, &mut execution).await.unwrap_err();

        assert!(matches!(err, GuardianError::ExecutionTimeout { .. }));
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(plan.steps[0].status, StepStatus::Failed);
    }
}
