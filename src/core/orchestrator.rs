//! 多代理工作流程協調服務
//!
//! 三個代理 (planner / executor / auditor) 只是狀態紀錄：
//! planner 透過 LLM 產生計畫，executor 依序執行步驟，auditor 統計稽核事件。
//! 所有紀錄都鏡像到 key-value 儲存 (`agent:{id}`、`plan:{id}`、`execution:{id}`、
//! `approval:{id}`、`audit:{id}`)。

use crate::adapters::{build_provider, build_store, SimulatedStepRunner};
use crate::config::{LlmConfig, Settings, WorkflowConfig};
use crate::core::audit::AuditTrail;
use crate::core::executor::WorkflowExecutor;
use crate::core::{demo, planner, records, risk};
use crate::domain::model::{
    Agent, AgentRole, AgentStatus, Approval, ApprovalStatus, AuditEvent, ComplianceStatus,
    ExecutionStatus, JsonMap, PlanStatus, Severity, StepStatus, WorkflowExecution, WorkflowPlan,
    WorkflowRequest,
};
use crate::domain::ports::{KeyValueStore, LlmProvider, LlmRequest, StepRunner};
use crate::utils::error::{GuardianError, Result};
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

pub const PLANNER_ID: &str = "planner-001";
pub const EXECUTOR_ID: &str = "executor-001";
pub const AUDITOR_ID: &str = "auditor-001";

pub struct OrchestrationService {
    store: Arc<dyn KeyValueStore>,
    llm: Arc<dyn LlmProvider>,
    runner: Arc<dyn StepRunner>,
    audit: AuditTrail,
    workflow: WorkflowConfig,
    temperature: f32,
    max_tokens: u32,
    agents: RwLock<BTreeMap<String, Agent>>,
    active_workflows: RwLock<HashMap<String, WorkflowExecution>>,
    /// 執行中的計畫 id；從狀態檢查到寫入 running 期間持有鎖
    running_plans: tokio::sync::Mutex<HashSet<String>>,
    execution_slots: Arc<Semaphore>,
    initialized: tokio::sync::Mutex<bool>,
}

/// 已通過檢查、等待執行的工作
struct PreparedRun {
    plan: WorkflowPlan,
    execution: WorkflowExecution,
    _permit: OwnedSemaphorePermit,
}

impl OrchestrationService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        llm: Arc<dyn LlmProvider>,
        runner: Arc<dyn StepRunner>,
        workflow: WorkflowConfig,
    ) -> Self {
        let slots = workflow.max_concurrent_workflows.max(1);
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            llm,
            runner,
            workflow,
            temperature: LlmConfig::default().temperature,
            max_tokens: LlmConfig::default().max_tokens,
            agents: RwLock::new(BTreeMap::new()),
            active_workflows: RwLock::new(HashMap::new()),
            running_plans: tokio::sync::Mutex::new(HashSet::new()),
            execution_slots: Arc::new(Semaphore::new(slots)),
            initialized: tokio::sync::Mutex::new(false),
        }
    }

    /// 依設定組出儲存、LLM 與步驟執行器，並完成初始化
    pub async fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        let store = build_store(&settings.storage).await?;
        let llm = build_provider(&settings.llm)?;
        let runner = Arc::new(SimulatedStepRunner::new(Duration::from_millis(
            settings.workflow.step_delay_ms,
        )));

        let service =
            Self::new(store, llm, runner, settings.workflow.clone()).with_llm_settings(&settings.llm);
        service.initialize().await?;
        Ok(Arc::new(service))
    }

    pub fn with_llm_settings(mut self, llm: &LlmConfig) -> Self {
        self.temperature = llm.temperature;
        self.max_tokens = llm.max_tokens;
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// 初始化代理名冊並寫入儲存；重複呼叫不會重建
    pub async fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        tracing::info!("Initializing orchestration service...");

        let mut roster = BTreeMap::new();
        for agent in self.default_agents() {
            // 保留儲存中既有的計數 (例如 Redis 重啟前的資料)
            let agent = match records::load::<Agent>(self.store.as_ref(), &records::agent_key(&agent.id)).await {
                Ok(Some(mut existing)) => {
                    existing.status = AgentStatus::Active;
                    existing.current_task = None;
                    existing
                }
                Ok(None) => agent,
                Err(e) => {
                    tracing::warn!("⚠️ Could not read stored agent {}: {}", agent.id, e);
                    agent
                }
            };
            records::save(self.store.as_ref(), &records::agent_key(&agent.id), &agent).await?;
            roster.insert(agent.id.clone(), agent);
        }

        tracing::info!("Initialized {} agents", roster.len());
        *self.agents.write().await = roster;

        if self.workflow.seed_demo_data {
            demo::seed_demo_data(self).await?;
        }

        *initialized = true;
        Ok(())
    }

    fn default_agents(&self) -> Vec<Agent> {
        let now = Utc::now();
        let config = |value: serde_json::Value| -> JsonMap {
            value.as_object().cloned().unwrap_or_default()
        };
        let caps = |items: &[&str]| items.iter().map(|c| c.to_string()).collect::<Vec<_>>();

        vec![
            Agent {
                id: PLANNER_ID.to_string(),
                name: "Workflow Planner".to_string(),
                role: AgentRole::Planner,
                status: AgentStatus::Active,
                description: "Analyzes requests and generates detailed execution plans with risk assessment"
                    .to_string(),
                capabilities: caps(&[
                    "natural_language_processing",
                    "workflow_planning",
                    "risk_assessment",
                    "plan_optimization",
                ]),
                config: config(json!({
                    "max_plan_steps": self.workflow.max_workflow_steps,
                    "risk_threshold": self.workflow.risk_threshold,
                    "planning_model": self.llm.model(),
                    "llm_provider": self.llm.name(),
                })),
                current_task: None,
                tasks_completed: 0,
                tasks_failed: 0,
                last_active: now,
            },
            Agent {
                id: EXECUTOR_ID.to_string(),
                name: "Workflow Executor".to_string(),
                role: AgentRole::Executor,
                status: AgentStatus::Active,
                description: "Executes approved workflow plans with real-time monitoring".to_string(),
                capabilities: caps(&[
                    "api_integration",
                    "parallel_execution",
                    "error_handling",
                    "progress_tracking",
                ]),
                config: config(json!({
                    "max_concurrent_executions": self.workflow.max_concurrent_workflows,
                    "execution_timeout": self.workflow.max_execution_time_minutes * 60,
                    "retry_attempts": 0,
                })),
                current_task: None,
                tasks_completed: 0,
                tasks_failed: 0,
                last_active: now,
            },
            Agent {
                id: AUDITOR_ID.to_string(),
                name: "Compliance Auditor".to_string(),
                role: AgentRole::Auditor,
                status: AgentStatus::Active,
                description: "Monitors all activities and maintains comprehensive audit trails".to_string(),
                capabilities: caps(&[
                    "activity_monitoring",
                    "compliance_checking",
                    "audit_logging",
                    "anomaly_detection",
                ]),
                config: config(json!({
                    "audit_level": "comprehensive",
                    "retention_days": 365,
                    "encryption_enabled": false,
                })),
                current_task: None,
                tasks_completed: 0,
                tasks_failed: 0,
                last_active: now,
            },
        ]
    }

    /// 修改名冊中的代理並寫回儲存
    pub(crate) async fn update_agent<F>(&self, agent_id: &str, update: F) -> Result<Agent>
    where
        F: FnOnce(&mut Agent),
    {
        // 寫入儲存成功後才更新名冊
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| GuardianError::not_found("Agent", agent_id))?;
        let mut updated = agent.clone();
        update(&mut updated);
        records::save(self.store.as_ref(), &records::agent_key(agent_id), &updated).await?;
        *agent = updated.clone();
        Ok(updated)
    }

    /// 寫入稽核事件並累計 auditor 的處理數
    pub async fn record_audit(&self, event: AuditEvent) {
        self.audit.record_quietly(event).await;
        if let Err(e) = self
            .update_agent(AUDITOR_ID, |auditor| {
                auditor.tasks_completed += 1;
                auditor.last_active = Utc::now();
            })
            .await
        {
            tracing::warn!("⚠️ Could not update auditor counters: {}", e);
        }
    }

    /// 透過 planner 代理產生工作流程計畫
    pub async fn create_workflow_plan(&self, request: WorkflowRequest) -> Result<WorkflowPlan> {
        if request.description.trim().is_empty() {
            return Err(GuardianError::validation("Description is required"));
        }
        tracing::info!("Creating workflow plan for request: {}", request.description);

        self.update_agent(PLANNER_ID, |planner| planner.begin_task(request.id.clone()))
            .await?;

        match self.generate_plan(&request).await {
            Ok(plan) => {
                self.update_agent(PLANNER_ID, |planner| planner.finish_task(true)).await?;
                tracing::info!(
                    "Created workflow plan {} with {} steps",
                    plan.id,
                    plan.steps.len()
                );
                Ok(plan)
            }
            Err(e) => {
                tracing::error!("❌ Failed to create workflow plan: {}", e);
                if let Err(agent_err) = self
                    .update_agent(PLANNER_ID, |planner| planner.finish_task(false))
                    .await
                {
                    tracing::error!("❌ Could not reset planner status: {}", agent_err);
                }
                self.record_audit(
                    AuditEvent::new("plan_generation_failed", "Workflow planning failed")
                        .with_user(request.user_id.clone())
                        .with_resource(request.id.clone())
                        .with_severity(Severity::Error)
                        .with_detail("error", e.user_friendly_message()),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn generate_plan(&self, request: &WorkflowRequest) -> Result<WorkflowPlan> {
        let llm_request = LlmRequest::new(planner::planning_prompt(request))
            .with_system(planner::PLANNER_SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self.llm.complete(&llm_request).await?;
        let mut plan = planner::parse_plan(
            &response.content,
            request,
            self.llm.name(),
            &response.model,
            self.workflow.max_workflow_steps,
        );
        if let Some(tokens) = response.tokens_used {
            plan.metadata.insert("tokens_used".to_string(), tokens.into());
        }

        if plan.approval_required {
            let approval = Approval {
                id: format!("approval-{}", uuid::Uuid::new_v4()),
                workflow_id: plan.id.clone(),
                workflow_name: plan.name.clone(),
                requested_by: plan.created_by.clone(),
                request_date: Utc::now(),
                status: ApprovalStatus::Pending,
                priority: request.priority,
                risk_assessment: risk::assess(&plan),
                steps_requiring_approval: plan
                    .steps
                    .iter()
                    .filter(|s| s.requires_approval)
                    .cloned()
                    .collect(),
                decided_by: None,
                decided_at: None,
                reason: None,
            };
            records::save(self.store.as_ref(), &records::approval_key(&approval.id), &approval).await?;
            plan.metadata
                .insert("approval_id".to_string(), approval.id.clone().into());
        } else {
            plan.status = PlanStatus::Approved;
        }

        records::save(self.store.as_ref(), &records::plan_key(&plan.id), &plan).await?;

        self.record_audit(
            AuditEvent::new("workflow_created", format!("Created plan '{}'", plan.name))
                .with_user(plan.created_by.clone())
                .with_resource(plan.id.clone())
                .with_detail("risk_level", plan.risk_level.as_str())
                .with_detail("steps", plan.steps.len())
                .with_detail("approval_required", plan.approval_required),
        )
        .await;

        Ok(plan)
    }

    async fn prepare_run(&self, plan_id: &str) -> Result<PreparedRun> {
        let mut running = self.running_plans.lock().await;
        if running.contains(plan_id) {
            return Err(Self::already_running(plan_id));
        }

        let mut plan = self
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| GuardianError::not_found("Workflow", plan_id))?;

        let blocked = match plan.status {
            PlanStatus::Approved | PlanStatus::Completed | PlanStatus::Failed => None,
            PlanStatus::PendingApproval => Some(format!("Workflow {} is awaiting approval", plan_id)),
            PlanStatus::Rejected => Some(format!("Workflow {} was rejected", plan_id)),
            PlanStatus::Running => return Err(Self::already_running(plan_id)),
        };
        if let Some(message) = blocked {
            drop(running);
            // 未核准就嘗試執行視為合規違規
            self.record_audit(
                AuditEvent::new("execution_blocked", message.clone())
                    .with_resource(plan.id.clone())
                    .with_severity(Severity::Warning)
                    .with_compliance(ComplianceStatus::Violation),
            )
            .await;
            return Err(GuardianError::Conflict { message });
        }

        let permit = self
            .execution_slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| GuardianError::Conflict {
                message: format!(
                    "Maximum of {} concurrent workflows reached",
                    self.workflow.max_concurrent_workflows
                ),
            })?;

        // 代理先更新，失敗時計畫維持原狀態
        self.update_agent(EXECUTOR_ID, |executor| executor.begin_task(plan.id.clone()))
            .await?;

        for step in &mut plan.steps {
            step.status = StepStatus::Pending;
        }
        plan.status = PlanStatus::Running;
        if let Err(e) = records::save(self.store.as_ref(), &records::plan_key(&plan.id), &plan).await {
            self.release_executor().await;
            return Err(e);
        }

        running.insert(plan.id.clone());
        drop(running);

        let execution = WorkflowExecution::start(&plan.id, EXECUTOR_ID);
        self.active_workflows
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());

        tracing::info!("Starting execution of workflow plan {}", plan.id);
        self.record_audit(
            AuditEvent::new("workflow_started", format!("Started execution of '{}'", plan.name))
                .with_user(EXECUTOR_ID)
                .with_resource(plan.id.clone())
                .with_detail("execution_id", execution.id.clone()),
        )
        .await;

        Ok(PreparedRun {
            plan,
            execution,
            _permit: permit,
        })
    }

    fn already_running(plan_id: &str) -> GuardianError {
        GuardianError::Conflict {
            message: format!("Workflow {} is already running", plan_id),
        }
    }

    /// 執行未開始就放回 executor，不計入成敗
    async fn release_executor(&self) {
        if let Err(e) = self
            .update_agent(EXECUTOR_ID, |executor| {
                executor.status = AgentStatus::Active;
                executor.current_task = None;
            })
            .await
        {
            tracing::error!("❌ Could not reset executor status: {}", e);
        }
    }

    async fn run_prepared(&self, prepared: PreparedRun) -> Result<WorkflowExecution> {
        let PreparedRun {
            mut plan,
            mut execution,
            _permit,
        } = prepared;

        let mut executor = WorkflowExecutor::new(self.store.clone(), self.runner.clone());
        if self.workflow.max_execution_time_minutes > 0 {
            executor = executor
                .with_time_limit(Duration::from_secs(self.workflow.max_execution_time_minutes * 60));
        }

        let outcome = executor.run(&mut plan, &mut execution).await;
        let succeeded = outcome.is_ok();

        self.active_workflows.write().await.remove(&execution.id);
        if let Err(e) = self
            .update_agent(EXECUTOR_ID, |executor| executor.finish_task(succeeded))
            .await
        {
            tracing::error!("❌ Could not update executor counters: {}", e);
        }

        let event = if succeeded {
            AuditEvent::new("workflow_completed", format!("Completed '{}'", plan.name))
        } else {
            AuditEvent::new("workflow_failed", format!("Execution of '{}' failed", plan.name))
                .with_severity(Severity::Error)
                .with_detail(
                    "error",
                    execution.error_message.clone().unwrap_or_default(),
                )
        };
        self.record_audit(
            event
                .with_user(EXECUTOR_ID)
                .with_resource(plan.id.clone())
                .with_detail("execution_id", execution.id.clone())
                .with_detail("completed_steps", execution.completed_steps()),
        )
        .await;

        // 計畫狀態最後寫入，讀到 completed/failed 時其他紀錄已更新
        plan.status = if succeeded {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        let saved = records::save(self.store.as_ref(), &records::plan_key(&plan.id), &plan).await;
        self.running_plans.lock().await.remove(&plan.id);
        if let Err(e) = saved {
            tracing::error!("❌ Could not save final status of plan {}: {}", plan.id, e);
            return Err(e);
        }

        outcome.map(|_| execution)
    }

    /// 執行已核准的計畫並等待完成
    pub async fn execute_workflow(&self, plan_id: &str) -> Result<WorkflowExecution> {
        let prepared = self.prepare_run(plan_id).await?;
        self.run_prepared(prepared).await
    }

    /// 在背景執行計畫，立即回傳剛建立的 execution
    pub async fn start_workflow(self: &Arc<Self>, plan_id: &str) -> Result<WorkflowExecution> {
        let prepared = self.prepare_run(plan_id).await?;
        let execution = prepared.execution.clone();

        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.run_prepared(prepared).await {
                tracing::warn!("⚠️ Background workflow run ended with error: {}", e);
            }
        });

        Ok(execution)
    }

    pub async fn approve(&self, approval_id: &str, user_id: &str) -> Result<Approval> {
        self.decide(approval_id, user_id, ApprovalStatus::Approved, None).await
    }

    pub async fn reject(&self, approval_id: &str, user_id: &str, reason: Option<String>) -> Result<Approval> {
        self.decide(approval_id, user_id, ApprovalStatus::Rejected, reason).await
    }

    async fn decide(
        &self,
        approval_id: &str,
        user_id: &str,
        decision: ApprovalStatus,
        reason: Option<String>,
    ) -> Result<Approval> {
        let mut approval = self
            .get_approval(approval_id)
            .await?
            .ok_or_else(|| GuardianError::not_found("Approval", approval_id))?;

        if approval.status != ApprovalStatus::Pending {
            return Err(GuardianError::Conflict {
                message: format!("Approval {} has already been decided", approval_id),
            });
        }

        approval.status = decision;
        approval.decided_by = Some(user_id.to_string());
        approval.decided_at = Some(Utc::now());
        approval.reason = reason.clone();
        records::save(self.store.as_ref(), &records::approval_key(&approval.id), &approval).await?;

        if let Some(mut plan) = self.get_plan(&approval.workflow_id).await? {
            plan.status = match decision {
                ApprovalStatus::Approved => PlanStatus::Approved,
                _ => PlanStatus::Rejected,
            };
            records::save(self.store.as_ref(), &records::plan_key(&plan.id), &plan).await?;
        }

        let event = match decision {
            ApprovalStatus::Approved => AuditEvent::new(
                "approval_granted",
                format!("Approved '{}'", approval.workflow_name),
            ),
            _ => AuditEvent::new(
                "approval_rejected",
                format!("Rejected '{}'", approval.workflow_name),
            )
            .with_severity(Severity::Warning)
            .with_detail("reason", reason.unwrap_or_default()),
        };
        self.record_audit(
            event
                .with_user(user_id.to_string())
                .with_resource(approval.workflow_id.clone())
                .with_detail("approval_id", approval.id.clone()),
        )
        .await;

        Ok(approval)
    }

    /// 讀取代理狀態；儲存失敗時退回記憶體中的名冊
    pub async fn get_agent_status(&self, agent_id: &str) -> Result<Option<Agent>> {
        match records::load::<Agent>(self.store.as_ref(), &records::agent_key(agent_id)).await {
            Ok(Some(agent)) => Ok(Some(agent)),
            Ok(None) => Ok(self.agents.read().await.get(agent_id).cloned()),
            Err(e) => {
                tracing::error!("❌ Failed to get agent status: {}", e);
                Ok(self.agents.read().await.get(agent_id).cloned())
            }
        }
    }

    pub async fn get_all_agents(&self) -> Result<Vec<Agent>> {
        let ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        let mut agents = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(agent) = self.get_agent_status(&id).await? {
                agents.push(agent);
            }
        }
        Ok(agents)
    }

    /// 優先讀取儲存，沒有時退回執行中的紀錄
    pub async fn get_workflow_execution(&self, execution_id: &str) -> Result<Option<WorkflowExecution>> {
        let active = self.active_workflows.read().await.get(execution_id).cloned();
        let stored = records::load(self.store.as_ref(), &records::execution_key(execution_id)).await?;
        // 儲存中的進度比記憶體中的起始快照新
        Ok(stored.or(active))
    }

    pub async fn active_execution_count(&self) -> usize {
        self.active_workflows.read().await.len()
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<WorkflowPlan>> {
        records::load(self.store.as_ref(), &records::plan_key(plan_id)).await
    }

    /// 依建立時間新到舊
    pub async fn list_plans(&self) -> Result<Vec<WorkflowPlan>> {
        let mut plans: Vec<WorkflowPlan> = records::load_all(self.store.as_ref(), "plan:").await?;
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }

    pub async fn list_executions(&self) -> Result<Vec<WorkflowExecution>> {
        records::load_all(self.store.as_ref(), "execution:").await
    }

    pub async fn latest_execution_for(&self, plan_id: &str) -> Result<Option<WorkflowExecution>> {
        let executions = self.list_executions().await?;
        Ok(executions
            .into_iter()
            .filter(|e| e.plan_id == plan_id)
            .max_by_key(|e| e.started_at))
    }

    pub async fn get_approval(&self, approval_id: &str) -> Result<Option<Approval>> {
        records::load(self.store.as_ref(), &records::approval_key(approval_id)).await
    }

    /// 依申請時間新到舊，可選擇只列出特定狀態
    pub async fn list_approvals(&self, status: Option<ApprovalStatus>) -> Result<Vec<Approval>> {
        let mut approvals: Vec<Approval> = records::load_all(self.store.as_ref(), "approval:").await?;
        if let Some(status) = status {
            approvals.retain(|a| a.status == status);
        }
        approvals.sort_by(|a, b| b.request_date.cmp(&a.request_date));
        Ok(approvals)
    }

    /// 工作流程即時狀態
    pub async fn workflow_status(&self, plan_id: &str) -> Result<JsonMap> {
        let plan = self
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| GuardianError::not_found("Workflow", plan_id))?;
        let execution = self.latest_execution_for(plan_id).await?;

        let mut status = match &execution {
            Some(execution) => WorkflowExecutor::execution_summary(&plan, execution),
            None => {
                let mut summary = JsonMap::new();
                summary.insert("progress".to_string(), 0.into());
                summary.insert("current_step".to_string(), serde_json::Value::Null);
                summary.insert(
                    "estimated_time_remaining".to_string(),
                    format!("{} minutes", plan.estimated_duration).into(),
                );
                summary
            }
        };

        status.insert("workflow_id".to_string(), plan.id.clone().into());
        status.insert("status".to_string(), plan.status.as_str().into());
        status.insert(
            "execution_id".to_string(),
            execution
                .as_ref()
                .map(|e| serde_json::Value::from(e.id.clone()))
                .unwrap_or(serde_json::Value::Null),
        );
        status.insert("last_updated".to_string(), Utc::now().to_rfc3339().into());
        Ok(status)
    }

    pub(crate) fn execution_is_finished(execution: &WorkflowExecution) -> bool {
        execution.status != ExecutionStatus::Running
    }
}
