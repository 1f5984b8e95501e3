//! 示範用登入流程，token 只是隨機字串，不做任何驗證

use super::response::{ApiError, ApiResult};
use crate::utils::validation::require_fields;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const DEMO_EMAIL: &str = "admin@opsflow.com";
const DEMO_PASSWORD: &str = "admin123";
const TOKEN_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterBody {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshBody {
    pub refresh_token: Option<String>,
}

fn issue_tokens() -> Value {
    json!({
        "access_token": format!("mock-jwt-token-{}", uuid::Uuid::new_v4()),
        "token_type": "bearer",
        "expires_in": TOKEN_TTL_SECONDS,
        "refresh_token": format!("mock-refresh-token-{}", uuid::Uuid::new_v4()),
    })
}

fn demo_user() -> Value {
    json!({
        "user_id": "user-001",
        "email": DEMO_EMAIL,
        "name": "Admin User",
        "role": "administrator",
        "permissions": ["read", "write", "approve", "admin"],
        "company": "OpsFlow Inc",
    })
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

pub async fn login(Json(body): Json<LoginBody>) -> ApiResult {
    if is_blank(&body.email) || is_blank(&body.password) {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    if body.email.as_deref() != Some(DEMO_EMAIL) || body.password.as_deref() != Some(DEMO_PASSWORD) {
        tracing::warn!("⚠️ Rejected login for {:?}", body.email);
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "user": demo_user(),
        "tokens": issue_tokens(),
    })))
}

pub async fn register(Json(body): Json<RegisterBody>) -> ApiResult {
    require_fields(&[
        ("email", body.email.as_deref()),
        ("password", body.password.as_deref()),
        ("name", body.name.as_deref()),
    ])?;

    Ok(Json(json!({
        "success": true,
        "message": "Registration successful. Please verify your email.",
        "user": {
            "user_id": format!("user-{}", uuid::Uuid::new_v4()),
            "email": body.email,
            "name": body.name,
            "role": "user",
            "company": body.company.unwrap_or_default(),
            "created_at": Utc::now(),
            "is_verified": false,
        },
    })))
}

pub async fn refresh(Json(body): Json<RefreshBody>) -> ApiResult {
    if is_blank(&body.refresh_token) {
        return Err(ApiError::bad_request("Refresh token is required"));
    }
    Ok(Json(json!({
        "success": true,
        "tokens": issue_tokens(),
    })))
}

pub async fn logout() -> ApiResult {
    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully",
    })))
}

pub async fn me() -> ApiResult {
    let mut user = demo_user();
    if let Some(object) = user.as_object_mut() {
        object.insert(
            "preferences".to_string(),
            json!({"theme": "dark", "notifications": true, "timezone": "UTC"}),
        );
    }
    Ok(Json(json!({
        "success": true,
        "user": user,
    })))
}
