//! Gateway Dispatch
//!
//! Serves every kind through the gateway, shaped by its embedded definition.

use super::client::ClientRegistry;
use crate::error::ApiError;
use crate::resource::{
    get_kind_def, Description, FetchContext, KindDef, Page, ResourceApi, ResourceFactory,
    ResourceKind, Usage, UsageDef,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Path of the metric summation endpoint
const METRIC_SUM_PATH: &str = "/cloudwatch/metrics/sum";

/// Build a factory with every defined kind served by the gateway
pub fn gateway_factory(clients: Arc<ClientRegistry>) -> ResourceFactory {
    ResourceKind::ALL
        .into_iter()
        .filter_map(|kind| get_kind_def(kind).map(|def| (kind, def)))
        .fold(ResourceFactory::new(), |factory, (kind, def)| {
            factory.register(
                kind,
                Arc::new(GatewayApi::new(kind, def, Arc::clone(&clients))),
            )
        })
}

/// [`ResourceApi`] over the gateway for one kind
pub struct GatewayApi {
    kind: ResourceKind,
    def: &'static KindDef,
    clients: Arc<ClientRegistry>,
}

impl GatewayApi {
    pub fn new(kind: ResourceKind, def: &'static KindDef, clients: Arc<ClientRegistry>) -> Self {
        Self { kind, def, clients }
    }
}

/// Substitute an encoded resource name into a path template
fn name_path(template: &str, name: &str) -> String {
    template.replace("{name}", &urlencoding::encode(name))
}

/// Walk a dot path into a JSON value
fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, part| current.get(part))
}

/// Render a JSON scalar as an attribute string
pub fn json_to_attribute(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse one listing response into a page
pub fn parse_page(def: &KindDef, response: &Value) -> Result<Page, ApiError> {
    let items = value_at(response, &def.list.items_path)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ApiError::Transient(format!(
                "listing response has no array at '{}'",
                def.list.items_path
            ))
        })?;

    let names = items
        .iter()
        .filter_map(|item| match &def.list.name_field {
            Some(field) => item.get(field).and_then(Value::as_str),
            None => item.as_str(),
        })
        .map(str::to_string)
        .collect();

    let next = response
        .get(&def.list.next_token_field)
        .and_then(Value::as_str)
        .map(str::to_string);

    let has_more = match &def.list.has_more_field {
        Some(field) => response.get(field).and_then(Value::as_bool).unwrap_or(false),
        None => next.as_deref().is_some_and(|t| !t.is_empty()),
    };

    Ok(Page {
        names,
        next,
        has_more,
    })
}

/// Parse a describe response: `{"attributes": {..}, "relations": {name: [..]}}`.
///
/// Relations the kind declares but the response omits are empty sets.
pub fn parse_description(def: &KindDef, response: &Value) -> Description {
    let attributes = response
        .get("attributes")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let mut relations = response
        .get("relations")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let members = v
                        .as_array()
                        .map(|arr| arr.iter().map(json_to_attribute).collect::<BTreeSet<_>>())
                        .unwrap_or_default();
                    (k.clone(), members)
                })
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();
    for relation in &def.relations {
        relations.entry(relation.clone()).or_default();
    }

    Description {
        attributes,
        relations,
    }
}

#[async_trait]
impl ResourceApi for GatewayApi {
    async fn list_page(
        &self,
        ctx: &FetchContext,
        cursor: Option<&str>,
    ) -> Result<Page, ApiError> {
        tracing::debug!(
            "Listing {} via {} in {} (cursor {:?})",
            self.def.display_name,
            self.def.service,
            ctx,
            cursor
        );
        let client = self.clients.client_for(ctx).await?;
        let response = client
            .get(&self.def.list.path, &[(self.def.list.cursor_param.as_str(), cursor)])
            .await?;
        parse_page(self.def, &response)
    }

    async fn describe(&self, ctx: &FetchContext, name: &str) -> Result<Description, ApiError> {
        let client = self.clients.client_for(ctx).await?;
        let response = client
            .get(&name_path(&self.def.describe_path, name), &[])
            .await?;
        Ok(parse_description(self.def, &response))
    }

    async fn delete(&self, ctx: &FetchContext, name: &str) -> Result<(), ApiError> {
        let client = self.clients.client_for(ctx).await?;
        client.delete(&name_path(&self.def.delete_path, name)).await?;
        Ok(())
    }

    async fn usage(
        &self,
        ctx: &FetchContext,
        name: &str,
        window_days: u32,
    ) -> Result<Usage, ApiError> {
        match &self.def.usage {
            UsageDef::None => Ok(Usage::None),
            UsageDef::Metric {
                namespace,
                dimension,
                metrics,
            } => {
                let client = self.clients.client_for(ctx).await?;
                let days = window_days.to_string();
                let mut total: Option<f64> = None;

                for metric in metrics {
                    let response = client
                        .get(
                            METRIC_SUM_PATH,
                            &[
                                ("namespace", Some(namespace.as_str())),
                                ("metric", Some(metric.as_str())),
                                ("dimension", Some(dimension.as_str())),
                                ("value", Some(name)),
                                ("days", Some(days.as_str())),
                            ],
                        )
                        .await?;
                    if let Some(sum) = response.get("Sum").and_then(Value::as_f64) {
                        *total.get_or_insert(0.0) += sum;
                    }
                }

                tracing::debug!("{} {} usage over {}d: {:?}", self.kind, name, window_days, total);
                Ok(total.map_or(Usage::None, Usage::Volume))
            }
            UsageDef::LastAccessed { path, field } => {
                let client = self.clients.client_for(ctx).await?;
                let response = client.get(&name_path(path, name), &[]).await?;
                match response.get(field).and_then(Value::as_str) {
                    None => Ok(Usage::None),
                    Some(raw) => DateTime::parse_from_rfc3339(raw)
                        .map(|at| Usage::LastUsed(at.with_timezone(&Utc)))
                        .map_err(|e| {
                            ApiError::Transient(format!("invalid {} timestamp '{}': {}", field, raw, e))
                        }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_page_with_object_items() {
        let def = get_kind_def(ResourceKind::Topic).unwrap();
        let page = parse_page(
            def,
            &json!({ "Topics": [{"TopicName": "a"}, {"TopicName": "b"}], "NextToken": "n1" }),
        )
        .unwrap();
        assert_eq!(page.names, vec!["a", "b"]);
        assert_eq!(page.next.as_deref(), Some("n1"));
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_page_explicit_flag_wins() {
        let def = get_kind_def(ResourceKind::Role).unwrap();
        let page = parse_page(
            def,
            &json!({ "Roles": [{"RoleName": "r"}], "Marker": "m", "IsTruncated": false }),
        )
        .unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_page_empty_token_is_exhausted() {
        let def = get_kind_def(ResourceKind::Queue).unwrap();
        let page = parse_page(def, &json!({ "QueueNames": ["q"], "NextToken": "" })).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_page_missing_items_is_error() {
        let def = get_kind_def(ResourceKind::Queue).unwrap();
        assert!(parse_page(def, &json!({ "Other": [] })).is_err());
    }

    #[test]
    fn test_parse_description() {
        let def = get_kind_def(ResourceKind::Queue).unwrap();
        let desc = parse_description(
            def,
            &json!({
                "attributes": { "VisibilityTimeout": 30, "FifoQueue": false },
                "relations": { "alarms": ["depth", "age"] }
            }),
        );
        assert_eq!(desc.attributes["VisibilityTimeout"], "30");
        assert_eq!(desc.attributes["FifoQueue"], "false");
        assert_eq!(desc.relations["alarms"].len(), 2);
        // Declared but not reported
        assert!(desc.relations["dead_letter_queue"].is_empty());
        assert!(desc.relations["subscriptions"].is_empty());
        assert_eq!(desc.relations.len(), 3);
    }

    #[test]
    fn test_name_path_encodes() {
        assert_eq!(name_path("/sqs/queues/{name}", "b c"), "/sqs/queues/b%20c");
    }
}
