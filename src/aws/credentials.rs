//! Gateway credentials
//!
//! The base token comes from the environment. When a context names a role to
//! assume, the base token is exchanged for a session token at the gateway and
//! cached until shortly before it expires.

use super::http::GatewayHttpClient;
use crate::error::ApiError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Environment variable holding the base gateway token
pub const TOKEN_ENV: &str = "CLOUD_REAPER_TOKEN";

/// Refresh session tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Session TTL assumed when the gateway does not report one
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Read the base token from the environment
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Credentials for one `(region, assumeRoleArn)` scope
#[derive(Clone)]
pub struct GatewayCredentials {
    base_token: String,
    role_arn: Option<String>,
    assume_url: String,
    http: GatewayHttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl GatewayCredentials {
    pub fn new(
        base_token: &str,
        role_arn: Option<&str>,
        endpoint: &str,
        http: GatewayHttpClient,
    ) -> Self {
        Self {
            base_token: base_token.to_string(),
            role_arn: role_arn.map(str::to_string),
            assume_url: format!("{}/sts/assume-role", endpoint.trim_end_matches('/')),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Token to present on API calls
    pub async fn get_token(&self) -> Result<String, ApiError> {
        let Some(role_arn) = self.role_arn.as_deref() else {
            return Ok(self.base_token.clone());
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Session token for {} expired, assuming role again", role_arn);
            }
        }

        let mut cache = self.token_cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
            return Ok(cached.token.clone());
        }

        let fresh = self.assume_role(role_arn).await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }

    async fn assume_role(&self, role_arn: &str) -> Result<CachedToken, ApiError> {
        let session_name = format!("cloud-reaper-{}", uuid::Uuid::new_v4().simple());
        tracing::info!("Assuming role {} (session {})", role_arn, session_name);

        let response = self
            .http
            .post(
                &self.assume_url,
                &self.base_token,
                &json!({ "RoleArn": role_arn, "RoleSessionName": session_name }),
            )
            .await?;

        parse_session(&response)
    }
}

fn parse_session(response: &Value) -> Result<CachedToken, ApiError> {
    let token = response
        .get("SessionToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Transient("assume-role response has no SessionToken".into()))?;

    let ttl = response
        .get("ExpiresIn")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SESSION_TTL);

    Ok(CachedToken {
        token: token.to_string(),
        expires_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_applies_buffer() {
        let cached = parse_session(&json!({ "SessionToken": "abc", "ExpiresIn": 30 })).unwrap();
        assert_eq!(cached.token, "abc");
        // 30s TTL minus a 60s buffer is already expired
        assert!(!cached.is_valid());

        let cached = parse_session(&json!({ "SessionToken": "abc" })).unwrap();
        assert!(cached.is_valid());
    }

    #[test]
    fn test_parse_session_requires_token() {
        assert!(parse_session(&json!({ "ExpiresIn": 900 })).is_err());
    }

    #[tokio::test]
    async fn test_base_token_without_role() {
        let http = GatewayHttpClient::new().unwrap();
        let creds = GatewayCredentials::new("base", None, "http://localhost:1", http);
        assert_eq!(creds.get_token().await.unwrap(), "base");
    }
}
