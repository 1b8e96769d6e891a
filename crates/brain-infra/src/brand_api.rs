//! Outbound brand API client (§4.4, §4.6): one `reqwest::Client` used
//! for both Schema fetches and Action execution calls, since both are
//! just per-brand HTTP endpoints described by registry definitions.

use async_trait::async_trait;
use brain_core::{ActionDefinition, ActionExecutorClient, SchemaDefinition, SchemaFetcher};
use brain_types::{BrainError, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub struct BrandApiClient {
    client: Client,
    default_headers: HashMap<String, String>,
}

impl BrandApiClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build brand API client");

        Self {
            client,
            default_headers: HashMap::new(),
        }
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build brand API client");

        Self {
            client,
            default_headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.default_headers.insert(key, value);
        self
    }

    async fn call(
        &self,
        method: &str,
        url: &str,
        timeout_ms: u64,
        auth_spec: &str,
        body: Option<&Value>,
    ) -> Result<(reqwest::StatusCode, Value)> {
        let mut request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            other => return Err(BrainError::Validation(format!("unsupported HTTP method: {other}"))),
        };

        request = request.timeout(Duration::from_millis(timeout_ms));

        for (key, value) in &self.default_headers {
            request = request.header(key, value);
        }
        if !auth_spec.is_empty() {
            request = request.header("Authorization", auth_spec);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                BrainError::ExternalTransient(format!("brand API call failed: {e}"))
            } else {
                BrainError::ExternalPermanent(format!("brand API call failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BrainError::ExternalTransient(format!(
                "brand API returned {status}"
            )));
        }
        if status.is_client_error() {
            return Err(BrainError::ExternalPermanent(format!(
                "brand API returned {status}"
            )));
        }

        let json = response
            .json::<Value>()
            .await
            .map_err(|e| BrainError::ExternalPermanent(format!("invalid JSON response: {e}")))?;
        Ok((status, json))
    }
}

impl Default for BrandApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaFetcher for BrandApiClient {
    async fn fetch(&self, schema: &SchemaDefinition) -> Result<Value> {
        let (_, body) = self
            .call(&schema.api_method, &schema.api_endpoint, schema.timeout_ms, &schema.auth_spec, None)
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl ActionExecutorClient for BrandApiClient {
    async fn execute(&self, action: &ActionDefinition, params: &HashMap<String, String>) -> Result<Value> {
        let body = serde_json::to_value(params)?;
        let (status, response_body) = self
            .call(&action.api_method, &action.api_endpoint, action.timeout_ms, "", Some(&body))
            .await?;

        let outcome = brain_core::criteria::CallOutcome {
            status_code: status.as_u16(),
            body: &response_body,
        };
        if !brain_core::criteria::evaluate(&action.success_criteria, &outcome) {
            return Err(BrainError::ExternalPermanent(format!(
                "response did not satisfy success_criteria: {}",
                action.success_criteria
            )));
        }
        if let Some(failure_criteria) = &action.failure_criteria {
            if brain_core::criteria::evaluate(failure_criteria, &outcome) {
                return Err(BrainError::ExternalPermanent(format!(
                    "response matched failure_criteria: {failure_criteria}"
                )));
            }
        }
        Ok(response_body)
    }
}
