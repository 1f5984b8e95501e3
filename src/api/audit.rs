use super::response::{ok_list, ApiError, ApiResult};
use super::AppState;
use crate::core::AuditFilter;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;

pub async fn list_events(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> ApiResult {
    let events = state.service.audit().list(&filter).await?;
    ok_list(&events)
}

/// 匯出 CSV 附件
pub async fn export_events(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let csv = state.service.audit().export_csv(&filter).await?;
    let filename = format!(
        "attachment; filename=\"audit-{}.csv\"",
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    ))
}
