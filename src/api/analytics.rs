use super::response::{ok, ApiResult};
use super::AppState;
use crate::core::analytics;
use axum::extract::State;

pub async fn dashboard(State(state): State<AppState>) -> ApiResult {
    let data = analytics::dashboard(&state.service, &state.monitor).await?;
    ok(data)
}
