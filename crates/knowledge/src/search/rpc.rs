//! PostgREST RPC search backend.
//!
//! Each source maps to an RPC function (e.g. `match_project_chunks`) plus a
//! set of fixed parameters. The request body is
//! `{query_embedding, match_count, ...route params, ...filters}` and the
//! response is an array of `{id, content, metadata, similarity}` rows.

use super::{SearchBackend, SearchFilters};
use crate::chunk::Chunk;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use velosight_core::config::{RpcRoute, SearchSettings};
use velosight_core::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct RpcRow {
    id: Value,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    similarity: Option<f32>,
}

impl RpcRow {
    fn into_chunk(self, source: &str) -> Chunk {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };

        Chunk {
            id,
            content: self.content.unwrap_or_default(),
            metadata: self.metadata.unwrap_or_default(),
            similarity: self.similarity.unwrap_or(0.0),
            source: source.to_string(),
        }
    }
}

/// Search backend calling PostgREST RPC functions over HTTP.
pub struct RpcSearchBackend {
    base_url: String,
    api_key: Option<String>,
    routes: BTreeMap<String, RpcRoute>,
    client: reqwest::Client,
}

impl RpcSearchBackend {
    /// Create a backend from settings and an optional service key.
    pub fn new(settings: &SearchSettings, api_key: Option<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create search HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
            routes: settings.routes.clone(),
            client,
        })
    }

    fn route(&self, source: &str) -> AppResult<&RpcRoute> {
        self.routes
            .get(source)
            .ok_or_else(|| AppError::retrieval(source, "no RPC route configured"))
    }

    fn build_payload(
        route: &RpcRoute,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Value {
        let mut body = Map::new();
        body.insert("query_embedding".to_string(), Value::from(vector.to_vec()));
        body.insert("match_count".to_string(), Value::from(k));
        for (key, value) in &route.params {
            body.insert(key.clone(), value.clone());
        }
        for (key, value) in filters.iter() {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

#[async_trait::async_trait]
impl SearchBackend for RpcSearchBackend {
    fn backend_name(&self) -> &str {
        "rpc"
    }

    async fn search(
        &self,
        source: &str,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<Chunk>> {
        let route = self.route(source)?;
        let url = format!("{}/{}", self.base_url, route.function);
        let payload = Self::build_payload(route, vector, k, filters);

        tracing::debug!(source, function = %route.function, k, "Calling search RPC");

        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::retrieval(source, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::retrieval(
                source,
                format!("RPC error ({}): {}", status, error_text),
            ));
        }

        let rows: Vec<RpcRow> = response
            .json()
            .await
            .map_err(|e| AppError::retrieval(source, format!("invalid RPC response: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.into_chunk(source)).collect())
    }
}
