//! HTTP client for the ModelCat platform API.
//!
//! Implements [`PlatformApi`] over `reqwest`: bearer token auth, JSON bodies,
//! and retries with exponential backoff on transient failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modelcat_connector_core::config::PACKAGE_NAME;
use modelcat_connector_core::contract::{
    AnalysisRequest, ApiError, PlatformApi, RegisteredDataset, StorageCredentials, UserProfile,
};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub oauth_token: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// First retry waits this long; each further retry doubles it.
    pub backoff_factor: Duration,
    pub retry_status_codes: Vec<u16>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "****"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_factor", &self.backoff_factor)
            .field("retry_status_codes", &self.retry_status_codes)
            .finish()
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, oauth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            oauth_token,
            timeout: Duration::from_secs(120),
            max_retries: 3,
            backoff_factor: Duration::from_millis(500),
            retry_status_codes: vec![500, 502, 503, 504],
        }
    }
}

pub struct ModelCatClient {
    config: ApiConfig,
    client: Client,
}

impl ModelCatClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        info!(base_url = %config.base_url, "Initialized platform API client");
        Ok(Self { config, client })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.oauth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.config.backoff_factor * 2u32.saturating_pow(retry)
    }

    /// Send the request built by `build`, retrying transient failures, and
    /// return the JSON body (`Null` when the body is not JSON).
    async fn send<F>(&self, method: Method, endpoint: &str, build: F) -> Result<Value, ApiError>
    where
        F: Fn(&Client, Method, String) -> RequestBuilder + Send + Sync,
    {
        let url = self.url(endpoint);
        let mut retry = 0;
        loop {
            let request = self.authorized(build(&self.client, method.clone(), url.clone()));
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let failure = if e.is_connect() {
                        Failure::Connect
                    } else if e.is_timeout() {
                        Failure::Timeout
                    } else {
                        return Err(ApiError::Transport(e.to_string()));
                    };
                    if retry < self.config.max_retries
                        && should_retry(&method, failure, &self.config.retry_status_codes)
                    {
                        warn!(%endpoint, retry, error = %e, "Request failed, retrying");
                        tokio::time::sleep(self.backoff(retry)).await;
                        retry += 1;
                        continue;
                    }
                    return Err(ApiError::Transport(e.to_string()));
                }
            };

            let status = response.status();
            if retry < self.config.max_retries
                && should_retry(
                    &method,
                    Failure::Status(status.as_u16()),
                    &self.config.retry_status_codes,
                )
            {
                warn!(%endpoint, retry, status = status.as_u16(), "Retryable status, retrying");
                tokio::time::sleep(self.backoff(retry)).await;
                retry += 1;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            debug!(%endpoint, status = status.as_u16(), bytes = text.len(), "Received response");
            return interpret_response(status, &text);
        }
    }

    async fn get(&self, endpoint: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, endpoint, |client, method, url| {
            client.request(method, url)
        })
        .await
    }

    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::POST, endpoint, |client, method, url| {
            client.request(method, url).json(body)
        })
        .await
    }
}

/// Why an attempt did not produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// The request never reached the server.
    Connect,
    Timeout,
    Status(u16),
}

/// Whether `failure` may be retried for `method`.
///
/// Only idempotent methods are re-sent after a timeout or a retryable
/// status, since the server may already have acted on the first attempt.
/// Connection failures are always safe to retry.
fn should_retry(method: &Method, failure: Failure, retry_status_codes: &[u16]) -> bool {
    let idempotent = [
        Method::GET,
        Method::HEAD,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
        Method::TRACE,
    ]
    .contains(method);
    match failure {
        Failure::Connect => true,
        Failure::Timeout => idempotent,
        Failure::Status(code) => idempotent && retry_status_codes.contains(&code),
    }
}

fn interpret_response(status: StatusCode, text: &str) -> Result<Value, ApiError> {
    let body: Option<Value> = serde_json::from_str(text).ok();
    if !status.is_success() {
        let body = match &body {
            Some(json) => serde_json::to_string_pretty(json).unwrap_or_else(|_| text.to_string()),
            None => text.to_string(),
        };
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let body = body.unwrap_or(Value::Null);
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(ApiError::Rejected(message));
    }
    Ok(body)
}

/// Check `fields` are present on `value`, then deserialize it.
fn require<T: DeserializeOwned>(value: &Value, fields: &[&str]) -> Result<T, ApiError> {
    let Some(map) = value.as_object().filter(|m| !m.is_empty()) else {
        return Err(ApiError::Empty);
    };
    let missing: Vec<String> = fields
        .iter()
        .filter(|f| !map.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::MissingFields(missing));
    }
    serde_json::from_value(value.clone()).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Text fields of the analysis job form, in submission order.
pub fn analysis_form_fields(
    request: &AnalysisRequest,
    now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let parameters = json!({ "dataset": [ { "path": request.dataset_uri } ] });
    vec![
        ("jobType", "Dataset Analysis".to_string()),
        (
            "jobDescription",
            format!(
                "Automatically generated by {PACKAGE_NAME} on {}",
                now.format("%b %d, %Y %H:%M UTC")
            ),
        ),
        ("board", "Virtual".to_string()),
        ("parameters", parameters.to_string()),
        ("groups", request.group_id.clone()),
        ("notesStructured", String::new()),
        ("outputGroupId", request.group_id.clone()),
        (
            "jobName",
            format!("Dataset Analysis on '{}'", request.dataset_name),
        ),
    ]
}

#[async_trait]
impl PlatformApi for ModelCatClient {
    async fn get_me(&self) -> Result<UserProfile, ApiError> {
        let body = self.get("/api/users/me").await?;
        let user: UserProfile =
            require(&body, &["user_id", "full_name", "email", "origin", "groups"])?;
        info!(email = %user.email, "Fetched current user");
        Ok(user)
    }

    async fn get_storage_credentials(
        &self,
        group_id: &str,
    ) -> Result<StorageCredentials, ApiError> {
        let body = self
            .post_json("/api/storage/token/generate", &json!({ "groupId": group_id }))
            .await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let credentials: StorageCredentials = require(
            &data,
            &[
                "group_id",
                "access_key_id",
                "secret_access_key",
                "expiration_date",
            ],
        )?;
        info!(group_id, expires = %credentials.expiration_date, "Generated storage token");
        Ok(credentials)
    }

    async fn register_dataset(
        &self,
        name: &str,
        s3_uri: &str,
        dataset_infos: Value,
    ) -> Result<RegisteredDataset, ApiError> {
        let request = json!({
            "name": name,
            "path": s3_uri,
            "datasetInfos": dataset_infos,
        });
        let body = self.post_json("/api/datasets/register", &request).await?;
        let uuid = body
            .get("uuid")
            .or_else(|| body.get("data").and_then(|d| d.get("uuid")))
            .and_then(|u| match u {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .ok_or_else(|| ApiError::MissingFields(vec!["uuid".to_string()]))?;
        info!(%uuid, name, "Registered dataset");
        Ok(RegisteredDataset { uuid })
    }

    async fn submit_dataset_analysis(&self, request: AnalysisRequest) -> Result<(), ApiError> {
        let fields = analysis_form_fields(&request, Utc::now());
        self.send(Method::POST, "/api/submit", |client, method, url| {
            let form = fields
                .iter()
                .fold(Form::new(), |form, (name, value)| form.text(*name, value.clone()))
                .text("file", "data");
            client.request(method, url).multipart(form)
        })
        .await?;
        info!(dataset = %request.dataset_name, "Submitted dataset analysis job");
        Ok(())
    }
}
