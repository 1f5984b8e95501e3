use crate::core::records;
use crate::domain::model::{AuditEvent, Severity};
use crate::domain::ports::KeyValueStore;
use crate::utils::error::Result;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub severity: Option<Severity>,
    pub event_type: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.severity.map_or(true, |s| event.severity == s)
            && self
                .event_type
                .as_deref()
                .map_or(true, |t| event.event_type == t)
            && self
                .resource_id
                .as_deref()
                .map_or(true, |r| event.resource_id.as_deref() == Some(r))
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| event.user_id.as_deref() == Some(u))
    }
}

/// 稽核軌跡，事件寫入 `audit:{id}`
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn KeyValueStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, event: AuditEvent) -> Result<()> {
        tracing::debug!(
            event_type = %event.event_type,
            resource = ?event.resource_id,
            "audit: {}",
            event.action
        );
        records::save(self.store.as_ref(), &records::audit_key(&event.id), &event).await
    }

    /// 寫入失敗只記錄錯誤，不影響主流程
    pub async fn record_quietly(&self, event: AuditEvent) {
        if let Err(e) = self.record(event).await {
            tracing::error!("❌ Failed to write audit event: {}", e);
        }
    }

    /// 依時間新到舊排序
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let mut events: Vec<AuditEvent> = records::load_all(self.store.as_ref(), "audit:").await?;
        events.retain(|e| filter.matches(e));
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    pub async fn export_csv(&self, filter: &AuditFilter) -> Result<String> {
        let events = self.list(filter).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record([
            "id",
            "timestamp",
            "event_type",
            "severity",
            "user_id",
            "resource_id",
            "action",
            "compliance_status",
            "details",
        ])?;

        for event in &events {
            let details = serde_json::to_string(&event.details)?;
            let timestamp = event.timestamp.to_rfc3339();
            writer.write_record([
                event.id.as_str(),
                timestamp.as_str(),
                event.event_type.as_str(),
                event.severity.as_str(),
                event.user_id.as_deref().unwrap_or(""),
                event.resource_id.as_deref().unwrap_or(""),
                event.action.as_str(),
                event.compliance_status.as_str(),
                details.as_str(),
            ])?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStore;
    use chrono::{Duration, Utc};

    async fn trail_with_events() -> AuditTrail {
        let trail = AuditTrail::new(Arc::new(MemoryStore::new()));

        let mut first = AuditEvent::new("workflow_created", "Created plan")
            .with_resource("plan-1")
            .with_user("hr-manager");
        first.timestamp = Utc::now() - Duration::minutes(10);
        trail.record(first).await.unwrap();

        let second = AuditEvent::new("workflow_failed", "Step failed, \"Slack\" down")
            .with_resource("plan-1")
            .with_severity(Severity::Error)
            .with_detail("step", "Execute Main Task");
        trail.record(second).await.unwrap();

        trail
            .record(AuditEvent::new("approval_granted", "Approved").with_resource("plan-2"))
            .await
            .unwrap();
        trail
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let trail = trail_with_events().await;

        let all = trail.list(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().event_type, "workflow_created");

        let plan_events = trail
            .list(&AuditFilter {
                resource_id: Some("plan-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plan_events.len(), 2);

        let errors = trail
            .list(&AuditFilter {
                severity: Some(Severity::Error),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event_type, "workflow_failed");

        let limited = trail
            .list(&AuditFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_export_csv_quotes_fields() {
        let trail = trail_with_events().await;
        let csv_text = trail
            .export_csv(&AuditFilter {
                event_type: Some("workflow_failed".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut lines = csv_text.lines();
        assert!(lines.next().unwrap().starts_with("id,timestamp,event_type,severity"));
        let row = lines.next().unwrap();
        assert!(row.contains("workflow_failed"));
        assert!(row.contains("\"Step failed, \"\"Slack\"\" down\""));
        assert!(lines.next().is_none());
    }
}
