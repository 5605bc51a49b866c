// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP backend speaking the PostgREST dialect.
//!
//! Provides [`RestBackend`], which maps the five outbox operations onto
//! `/rest/v1/{table}` and `/rest/v1/rpc/{name}` requests, authenticates with
//! the project API key, and converts error bodies into [`BackendError`].

use std::time::Duration;

use async_trait::async_trait;
use outpost_config::model::{BackendConfig, ConnectivityConfig};
use outpost_core::{
    Adapter, BackendError, Filter, HealthStatus, OutpostError, RemoteBackend,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Url};
use serde_json::{Map, Value};
use tracing::debug;

use crate::settings::SettingsSource;
use crate::types::{api_error, filter_pair};

const REST_PREFIX: &str = "rest/v1";

/// HTTP client for a PostgREST-compatible backend.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: Url,
    probe_path: String,
    probe_timeout: Duration,
}

impl RestBackend {
    /// Builds a client from the `[backend]` and `[connectivity]` sections.
    ///
    /// Fails with [`OutpostError::Config`] when `backend.url` is unset or
    /// unparseable, or when the API key is not a valid header value.
    pub fn new(
        backend: &BackendConfig,
        connectivity: &ConnectivityConfig,
    ) -> Result<Self, OutpostError> {
        let url = backend
            .url
            .as_deref()
            .ok_or_else(|| OutpostError::Config("backend.url is not set".into()))?;
        // A trailing slash makes `Url::join` append instead of replace.
        let base_url = Url::parse(&format!("{}/", url.trim_end_matches('/')))
            .map_err(|e| OutpostError::Config(format!("invalid backend.url `{url}`: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(key) = &backend.api_key {
            let invalid = |e: reqwest::header::InvalidHeaderValue| {
                OutpostError::Config(format!("invalid API key header value: {e}"))
            };
            headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(backend.timeout_secs))
            .build()
            .map_err(|e| OutpostError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            probe_path: connectivity.probe_path.clone(),
            probe_timeout: Duration::from_secs(connectivity.probe_timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::transport(format!("invalid request path `{path}`: {e}")))
    }

    fn table_url(&self, table: &str) -> Result<Url, BackendError> {
        self.endpoint(&format!("{REST_PREFIX}/{table}"))
    }

    fn filtered_url(&self, table: &str, filters: &[Filter]) -> Result<Url, BackendError> {
        let mut url = self.table_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            for filter in filters {
                let (column, value) = filter_pair(filter);
                pairs.append_pair(&column, &value);
            }
        }
        Ok(url)
    }

    /// Request builder for an insert-shaped write, honouring pass-through
    /// options (`onConflict`, `ignoreDuplicates`, `defaultToNull`, `count`).
    fn write_request(
        &self,
        table: &str,
        payload: &Value,
        options: &Map<String, Value>,
        upsert: bool,
    ) -> Result<RequestBuilder, BackendError> {
        let mut url = self.table_url(table)?;
        if let Some(columns) = options.get("onConflict").and_then(Value::as_str) {
            url.query_pairs_mut().append_pair("on_conflict", columns);
        }

        let mut prefer = vec!["return=representation".to_string()];
        if upsert {
            let ignore = options
                .get("ignoreDuplicates")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            prefer.push(
                if ignore {
                    "resolution=ignore-duplicates"
                } else {
                    "resolution=merge-duplicates"
                }
                .to_string(),
            );
        }
        if options.get("defaultToNull").and_then(Value::as_bool) == Some(false) {
            prefer.push("missing=default".to_string());
        }
        if let Some(count) = options.get("count").and_then(Value::as_str) {
            prefer.push(format!("count={count}"));
        }

        Ok(self
            .client
            .post(url)
            .header("prefer", prefer.join(","))
            .json(payload))
    }

    /// Send a request and decode its body.
    ///
    /// Empty success bodies (e.g. `204 No Content`) decode to `null`.
    async fn send(&self, request: RequestBuilder) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::transport(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::transport(format!("failed to read response body: {e}")))?;
        debug!(status = %status, bytes = body.len(), "backend response received");

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode {
            message: format!("failed to parse response body: {e}"),
        })
    }
}

#[async_trait]
impl Adapter for RestBackend {
    fn name(&self) -> &str {
        "postgrest"
    }

    /// Reachability probe. Any HTTP response means the host is reachable;
    /// 5xx answers are reported as degraded.
    async fn health_check(&self) -> Result<HealthStatus, OutpostError> {
        let url = self.endpoint(&self.probe_path)?;
        let result = self
            .client
            .request(Method::GET, url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        Ok(match result {
            Ok(response) if response.status().is_server_error() => {
                HealthStatus::Degraded(format!("backend answered {}", response.status()))
            }
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("backend unreachable: {e}")),
        })
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert(
        &self,
        table: &str,
        payload: &Value,
        options: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        debug!(table, "insert");
        let request = self.write_request(table, payload, options, false)?;
        self.send(request).await
    }

    async fn upsert(
        &self,
        table: &str,
        payload: &Value,
        options: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        debug!(table, "upsert");
        let request = self.write_request(table, payload, options, true)?;
        self.send(request).await
    }

    async fn update(
        &self,
        table: &str,
        payload: &Value,
        filters: &[Filter],
    ) -> Result<Value, BackendError> {
        debug!(table, filters = filters.len(), "update");
        let url = self.filtered_url(table, filters)?;
        let request = self
            .client
            .patch(url)
            .header("prefer", "return=representation")
            .json(payload);
        self.send(request).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError> {
        debug!(table, filters = filters.len(), "delete");
        let url = self.filtered_url(table, filters)?;
        let request = self
            .client
            .delete(url)
            .header("prefer", "return=representation");
        self.send(request).await
    }

    async fn rpc(&self, name: &str, params: &Value) -> Result<Value, BackendError> {
        debug!(name, "rpc");
        let url = self.endpoint(&format!("{REST_PREFIX}/rpc/{name}"))?;
        self.send(self.client.post(url).json(params)).await
    }
}

#[async_trait]
impl SettingsSource for RestBackend {
    async fn fetch_setting(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let mut url = self.table_url("app_settings")?;
        url.query_pairs_mut()
            .append_pair("select", "value")
            .append_pair("key", &format!("eq.{key}"))
            .append_pair("limit", "1");

        let rows = self.send(self.client.get(url)).await?;
        Ok(rows
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("value"))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// Matches when the `prefer` header lists `directive`.
    fn prefers(directive: &'static str) -> impl Fn(&Request) -> bool {
        move |request: &Request| {
            request
                .headers
                .get("prefer")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.split(',').any(|d| d.trim() == directive))
        }
    }

    fn backend_for(server: &MockServer) -> RestBackend {
        let backend = BackendConfig {
            url: Some(server.uri()),
            api_key: Some("anon-key".into()),
            timeout_secs: 5,
        };
        RestBackend::new(&backend, &ConnectivityConfig::default()).unwrap()
    }

    #[test]
    fn new_requires_url() {
        let err = RestBackend::new(&BackendConfig::default(), &ConnectivityConfig::default())
            .unwrap_err();
        assert!(matches!(err, OutpostError::Config(_)));
    }

    #[tokio::test]
    async fn upsert_sends_conflict_target_and_merge_preference() {
        let server = MockServer::start().await;
        let row = json!({"mission_day": "2026-02-24", "point_id": "pt1", "count": 5});
        Mock::given(method("POST"))
            .and(path("/rest/v1/census_entries"))
            .and(query_param("on_conflict", "mission_day,point_id"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(prefers("return=representation"))
            .and(prefers("resolution=merge-duplicates"))
            .and(body_json(&row))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row.clone()])))
            .expect(1)
            .mount(&server)
            .await;

        let options = Map::from_iter([("onConflict".to_string(), json!("mission_day,point_id"))]);
        let data = backend_for(&server)
            .upsert("census_entries", &row, &options)
            .await
            .unwrap();
        assert_eq!(data, json!([row]));
    }

    #[tokio::test]
    async fn ignore_duplicates_switches_resolution() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/people"))
            .and(prefers("resolution=ignore-duplicates"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let options = Map::from_iter([("ignoreDuplicates".to_string(), json!(true))]);
        backend_for(&server)
            .upsert("people", &json!({"id": "p1"}), &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_and_delete_render_eq_filters() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/demands"))
            .and(query_param("id", "eq.42"))
            .and(query_param("status", "eq.open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 42}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/demands"))
            .and(query_param("id", "eq.42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let filters = vec![Filter::eq("id", 42), Filter::eq("status", "open")];
        backend
            .update("demands", &json!({"status": "closed"}), &filters)
            .await
            .unwrap();
        let deleted = backend
            .delete("demands", &[Filter::eq("id", 42)])
            .await
            .unwrap();
        assert_eq!(deleted, Value::Null);
    }

    #[tokio::test]
    async fn rpc_posts_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/close_mission_day"))
            .and(body_json(json!({"day": "2026-02-24"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"closed": true})))
            .mount(&server)
            .await;

        let data = backend_for(&server)
            .rpc("close_mission_day", &json!({"day": "2026-02-24"}))
            .await
            .unwrap();
        assert_eq!(data, json!({"closed": true}));
    }

    #[tokio::test]
    async fn error_body_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/people"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table people",
                "details": null,
                "hint": null
            })))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .insert("people", &json!({"name": "Ana"}), &Map::new())
            .await
            .unwrap_err();
        match err {
            BackendError::Api {
                status, code, message, ..
            } => {
                assert_eq!(status, 403);
                assert_eq!(code.as_deref(), Some("42501"));
                assert!(message.contains("permission denied"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let server = MockServer::start().await;
        let backend = backend_for(&server);
        drop(server);

        let err = backend
            .insert("people", &json!({"name": "Ana"}), &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport { .. }));
        assert!(matches!(
            backend.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn health_check_accepts_any_client_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        assert_eq!(
            backend_for(&server).health_check().await.unwrap(),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn fetch_setting_reads_first_row_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/app_settings"))
            .and(query_param("key", "eq.mission_day_cutoff"))
            .and(query_param("select", "value"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"value": {"cutoff": "06:00"}}])),
            )
            .mount(&server)
            .await;

        let value = backend_for(&server)
            .fetch_setting("mission_day_cutoff")
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"cutoff": "06:00"})));
    }
}
