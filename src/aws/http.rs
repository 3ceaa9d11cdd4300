//! HTTP utilities for resource gateway calls

use crate::error::ApiError;
use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate and strip control characters before a body reaches the log
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Map a non-success status to the error taxonomy
fn status_error(status: StatusCode, url: &str) -> ApiError {
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(url.to_string()),
        StatusCode::CONFLICT => ApiError::Conflict(url.to_string()),
        _ => ApiError::Transient(format!("API request failed: {}", status)),
    }
}

/// HTTP client wrapper for gateway calls
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
}

impl GatewayHttpClient {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("cloud-reaper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send request")?;

        Self::read_json(response, url).await
    }

    pub async fn post(&self, url: &str, token: &str, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::read_json(response, url).await
    }

    pub async fn delete(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        tracing::debug!("DELETE {}", url);

        let response = self
            .client
            .delete(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send request")?;

        Self::read_json(response, url).await
    }

    async fn read_json(response: reqwest::Response, url: &str) -> Result<Value, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(status_error(status, url));
        }

        // Handle empty response
        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body).context("Failed to parse response JSON")?)
    }
}

/// Format an API error for display without leaking response details
pub fn format_api_error(error: &ApiError) -> String {
    match error {
        ApiError::NotFound(_) => "Resource not found.".to_string(),
        ApiError::Conflict(_) => {
            "Resource conflict. The resource may still be in use.".to_string()
        }
        ApiError::Transient(detail) => {
            if detail.contains("403") {
                return "Permission denied. Check the IAM permissions of the role.".to_string();
            }
            if detail.contains("401") {
                return "Authentication failed. Check the gateway token.".to_string();
            }
            if detail.contains("429") {
                return "Rate limit exceeded. Please try again later.".to_string();
            }
            if detail.contains("500") || detail.contains("503") {
                return "Service temporarily unavailable. Please try again.".to_string();
            }

            let sanitized = detail
                .chars()
                .filter(|c| c.is_ascii_graphic() || *c == ' ')
                .take(80)
                .collect::<String>();

            if sanitized.len() < detail.len() {
                format!("{}...", sanitized)
            } else {
                sanitized
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("500 bytes total"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::NOT_FOUND, "u").is_not_found());
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "u"),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "u"),
            ApiError::Transient(_)
        ));
    }

    #[test]
    fn test_format_api_error_hides_details() {
        let err = ApiError::Transient("API request failed: 403 Forbidden".into());
        assert!(format_api_error(&err).contains("Permission denied"));
        let err = ApiError::NotFound("https://gw/sqs/queues/secret".into());
        assert_eq!(format_api_error(&err), "Resource not found.");
    }
}
