use crate::utils::error::{GuardianError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    validate_url_with_schemes(field_name, url_str, &["http", "https"])
}

pub fn validate_url_with_schemes(field_name: &str, url_str: &str, schemes: &[&str]) -> Result<()> {
    if url_str.is_empty() {
        return Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) if schemes.contains(&url.scheme()) => Ok(()),
        Ok(url) => Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Unsupported URL scheme: {}", url.scheme()),
        }),
        Err(e) => Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_one_of(field_name: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Allowed values: {}", allowed.join(", ")),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(GuardianError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 檢查請求欄位，錯誤以 ValidationError 回報 (HTTP 400)
pub fn require_fields(fields: &[(&str, Option<&str>)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.map(|v| v.trim().is_empty()).unwrap_or(true))
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GuardianError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("llm.base_url", "https://example.com").is_ok());
        assert!(validate_url("llm.base_url", "http://example.com").is_ok());
        assert!(validate_url("llm.base_url", "").is_err());
        assert!(validate_url("llm.base_url", "invalid-url").is_err());
        assert!(validate_url("llm.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_redis_scheme() {
        let schemes = ["redis", "rediss"];
        assert!(validate_url_with_schemes("storage.redis_url", "redis://localhost:6379", &schemes).is_ok());
        assert!(validate_url_with_schemes("storage.redis_url", "http://localhost:6379", &schemes).is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("workflow.max_workflow_steps", 5, 1).is_ok());
        assert!(validate_positive_number("workflow.max_workflow_steps", 0, 1).is_err());
    }

    #[test]
    fn test_require_fields_lists_missing() {
        let err = require_fields(&[("email", Some("a@b.c")), ("password", Some("  ")), ("name", None)])
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Missing required fields: password, name");
    }
}
