//! Gateway client and the per-context client registry
//!
//! One [`AwsClient`] exists per distinct `(region, assumeRoleArn)` pair. The
//! [`ClientRegistry`] creates them on first use and keeps them for its own
//! lifetime; it is passed by reference to every component that needs one.

use super::credentials::GatewayCredentials;
use super::http::GatewayHttpClient;
use crate::error::ApiError;
use crate::resource::FetchContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Client bound to one fetch context
pub struct AwsClient {
    pub context: FetchContext,
    base_url: String,
    credentials: GatewayCredentials,
    http: GatewayHttpClient,
}

impl AwsClient {
    pub fn new(context: FetchContext, base_url: &str, token: &str, http: GatewayHttpClient) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let credentials = GatewayCredentials::new(
            token,
            context.assume_role_arn.as_deref(),
            &base_url,
            http.clone(),
        );
        Self {
            context,
            base_url,
            credentials,
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request URL from a path and query pairs (`None` values are skipped)
    pub fn url(&self, path: &str, query: &[(&str, Option<&str>)]) -> Result<String, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::Transient(format!("invalid gateway URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url.into())
    }

    pub async fn get(&self, path: &str, query: &[(&str, Option<&str>)]) -> Result<Value, ApiError> {
        let url = self.url(path, query)?;
        let token = self.credentials.get_token().await?;
        self.http.get(&url, &token).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.url(path, &[])?;
        let token = self.credentials.get_token().await?;
        self.http.delete(&url, &token).await
    }
}

/// Substitute `{region}` into an endpoint template
pub fn endpoint_for_region(template: &str, region: &str) -> String {
    template.replace("{region}", region)
}

/// Process-lifetime cache of clients keyed by fetch context
pub struct ClientRegistry {
    endpoint_template: String,
    token: String,
    http: GatewayHttpClient,
    clients: Mutex<HashMap<FetchContext, Arc<AwsClient>>>,
}

impl ClientRegistry {
    pub fn new(endpoint_template: &str, token: &str) -> Result<Self, ApiError> {
        Ok(Self {
            endpoint_template: endpoint_template.to_string(),
            token: token.to_string(),
            http: GatewayHttpClient::new()?,
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Get the shared client for a context, creating it on first use
    pub async fn client_for(&self, ctx: &FetchContext) -> Result<Arc<AwsClient>, ApiError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(ctx) {
            return Ok(Arc::clone(client));
        }

        let base_url = endpoint_for_region(&self.endpoint_template, &ctx.region);
        Url::parse(&base_url)
            .map_err(|e| ApiError::Transient(format!("invalid endpoint {base_url}: {e}")))?;

        tracing::info!("Creating client for {} at {}", ctx, base_url);
        let client = Arc::new(AwsClient::new(
            ctx.clone(),
            &base_url,
            &self.token,
            self.http.clone(),
        ));
        clients.insert(ctx.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Number of distinct contexts seen so far
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
