use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::auth::TokenSource;
use super::error::{ApiError, ApiErrorDetails};
use super::pool::ConnectionPoolConfig;
use crate::manifest::{Kind, Object};

pub const DEFAULT_URL: &str = "https://app.nobl9.com/api";
pub const DEFAULT_OKTA_ORG_URL: &str = "https://accounts.nobl9.com";
pub const DEFAULT_OKTA_AUTH_SERVER: &str = "auseg9kiegWKEtJZC416";
pub const DEFAULT_PROJECT: &str = "default";

const HEADER_ORGANIZATION: &str = "organization";
const HEADER_PROJECT: &str = "project";

/// Nobl9 API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    organization: Option<String>,
    project: String,
    tokens: TokenSource,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Read from the access token when not set
    pub organization: Option<String>,
    pub project: String,
    pub okta_org_url: String,
    pub okta_auth_server: String,
    pub user_agent: String,
    pub retry: RetryConfig,
    pub pool: ConnectionPoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            organization: None,
            project: DEFAULT_PROJECT.to_string(),
            okta_org_url: DEFAULT_OKTA_ORG_URL.to_string(),
            okta_auth_server: DEFAULT_OKTA_AUTH_SERVER.to_string(),
            user_agent: format!("terraform-provider-nobl9/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default(),
            pool: ConnectionPoolConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
        }
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        if config.client_id.is_empty() {
            return Err(ApiError::ConfigError("client_id is required".to_string()));
        }
        if config.client_secret.is_empty() {
            return Err(ApiError::ConfigError("client_secret is required".to_string()));
        }
        Url::parse(&config.url)
            .map_err(|e| ApiError::ConfigError(format!("invalid url '{}': {}", config.url, e)))?;
        Url::parse(&config.okta_org_url).map_err(|e| {
            ApiError::ConfigError(format!(
                "invalid okta_org_url '{}': {}",
                config.okta_org_url, e
            ))
        })?;

        let pool = ConnectionPoolConfig {
            request_timeout: Duration::from_secs(config.retry.timeout_seconds),
            ..config.pool
        };
        let http_client = pool.build_client(&config.user_agent)?;

        let tokens = TokenSource::new(
            http_client.clone(),
            &config.okta_org_url,
            &config.okta_auth_server,
            config.client_id,
            config.client_secret,
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: config.url.trim_end_matches('/').to_string(),
                organization: config.organization.filter(|o| !o.is_empty()),
                project: config.project,
                tokens,
                retry_config: config.retry,
            }),
        })
    }

    /// Project used when a request or import does not name one
    pub fn default_project(&self) -> &str {
        &self.inner.project
    }

    /// Creates or updates objects; the API treats apply as an upsert
    pub async fn apply(&self, objects: &[Object]) -> Result<(), ApiError> {
        let url = self.url("/apply", &[])?;
        let headers = self.headers(self.default_project()).await?;
        tracing::debug!(count = objects.len(), "applying objects");

        self.execute_with_retry(
            || {
                self.inner
                    .http_client
                    .put(url.clone())
                    .headers(headers.clone())
                    .json(objects)
                    .send()
            },
            "/apply",
        )
        .await?;
        Ok(())
    }

    /// Fetches objects of a kind by name; missing objects are simply absent from the result
    pub async fn get(
        &self,
        kind: Kind,
        project: Option<&str>,
        names: &[&str],
    ) -> Result<Vec<Object>, ApiError> {
        let path = format!("/get/{}", kind.as_path());
        let url = self.url(&path, names)?;
        let headers = self.headers(project.unwrap_or(self.default_project())).await?;

        let response = self
            .execute_with_retry(
                || {
                    self.inner
                        .http_client
                        .get(url.clone())
                        .headers(headers.clone())
                        .send()
                },
                &path,
            )
            .await?;
        self.parse_success_response(response).await
    }

    pub async fn delete_by_name(
        &self,
        kind: Kind,
        project: Option<&str>,
        names: &[&str],
    ) -> Result<(), ApiError> {
        let path = format!("/delete/{}", kind.as_path());
        let url = self.url(&path, names)?;
        let headers = self.headers(project.unwrap_or(self.default_project())).await?;

        self.execute_with_retry(
            || {
                self.inner
                    .http_client
                    .delete(url.clone())
                    .headers(headers.clone())
                    .send()
            },
            &path,
        )
        .await?;
        Ok(())
    }

    fn url(&self, path: &str, names: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.inner.base_url, path))
            .map_err(|e| ApiError::ConfigError(format!("invalid request url: {}", e)))?;
        if !names.is_empty() {
            let mut query = url.query_pairs_mut();
            for name in names {
                query.append_pair("name", name);
            }
        }
        Ok(url)
    }

    async fn headers(&self, project: &str) -> Result<HeaderMap, ApiError> {
        let token = self.inner.tokens.token().await?;
        let organization = self
            .inner
            .organization
            .clone()
            .or(token.organization)
            .ok_or_else(|| {
                ApiError::AuthError(
                    "organization is not configured and the access token does not carry one"
                        .to_string(),
                )
            })?;

        let value = |v: &str| {
            HeaderValue::from_str(v)
                .map_err(|e| ApiError::ConfigError(format!("invalid header value: {}", e)))
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value(&format!("Bearer {}", token.value))?);
        headers.insert(HEADER_ORGANIZATION, value(&organization)?);
        headers.insert(HEADER_PROJECT, value(project)?);
        Ok(headers)
    }

    /// Execute request with retry logic
    async fn execute_with_retry<F, Fut>(
        &self,
        request_fn: F,
        path: &str,
    ) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.inner.retry_config.max_retries {
            if attempt > 0 {
                let backoff = std::cmp::min(
                    self.inner.retry_config.initial_backoff_ms * (2_u64.pow(attempt - 1)),
                    self.inner.retry_config.max_backoff_ms,
                );
                tracing::debug!(
                    "Retrying request to {} after {}ms (attempt {})",
                    path,
                    backoff,
                    attempt
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        let text = response.text().await.unwrap_or_default();
                        return Err(ApiError::AuthError(text));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        let error = self.error_from_response(response).await;
                        // Callers retry these on their own schedule
                        if error.is_concurrency_issue() {
                            return Err(error);
                        }
                        tracing::warn!("request to {} failed: {}", path, error);
                        last_error = Some(error);
                    } else {
                        return Err(self.error_from_response(response).await);
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error =
                            Some(ApiError::Timeout(self.inner.retry_config.timeout_seconds));
                    } else if e.is_connect() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(ApiError::RequestError(e));
                    }
                }
            }

            attempt += 1;
        }

        let error = last_error.unwrap_or(ApiError::ServiceUnavailable);
        tracing::error!("request to {} failed after retries: {}", path, error);
        Err(error)
    }

    /// Parse successful response
    async fn parse_success_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::debug!("API response body: {}", text);

        serde_json::from_str::<T>(&text).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }

    async fn error_from_response(&self, response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let details = serde_json::from_str::<ApiErrorDetails>(&text)
            .ok()
            .filter(|d| !d.errors.is_empty());
        let message = match &details {
            Some(d) => d.summary(),
            None => text,
        };

        ApiError::ApiError {
            status,
            message,
            details: details.map(Box::new),
        }
    }
}
