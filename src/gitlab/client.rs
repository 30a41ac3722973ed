use std::fmt;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use log::{debug, warn};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use super::pagination::{next_page_token, Page, PageToken};
use crate::auth::Token;
use crate::error::{G2GError, Result};

/// Backoff schedule for transient GitLab failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// A REST resource below `api/v4/`, e.g. `projects/42/pipelines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl Resource {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    /// `projects/:id`, where `id` may also be a `group/project` path.
    pub fn project(id: &str) -> Self {
        Self::new(["projects", id])
    }

    pub fn user(id: i64) -> Self {
        Self::new(["users".to_string(), id.to_string()])
    }

    #[must_use]
    pub fn join(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    #[must_use]
    pub fn with_query<I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.query.extend(params);
        self
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            let separator = if i == 0 { '?' } else { '&' };
            write!(f, "{separator}{key}={value}")?;
        }
        Ok(())
    }
}

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Token,
    retry: RetryPolicy,
    per_page: u32,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Token) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gitlab2graph/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| G2GError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base = Url::parse(base_url)
            .map_err(|e| G2GError::Config(format!("Invalid GitLab URL: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let api_url = base
            .join("api/v4/")
            .map_err(|e| G2GError::Config(format!("Invalid API URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            retry: RetryPolicy::default(),
            per_page: 100,
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, 100);
        self
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(self.token.as_str())
    }

    fn resource_url(&self, resource: &Resource) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| G2GError::Config(format!("Cannot build URL for {resource}")))?
            .pop_if_empty()
            .extend(&resource.segments);
        if !resource.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&resource.query);
        }
        Ok(url)
    }

    /// Fetches one page of a listing. `token` is `None` for the first page.
    pub async fn fetch_page(&self, resource: &Resource, token: Option<&PageToken>) -> Result<Page> {
        let url = match token {
            Some(token) => token.url().clone(),
            None => {
                let mut url = self.resource_url(resource)?;
                url.query_pairs_mut()
                    .append_pair("per_page", &self.per_page.to_string());
                url
            }
        };

        let (headers, body) = self.get_with_retry(resource, &url).await?;
        let next = next_page_token(&headers, &url);
        match body {
            Value::Array(records) => {
                debug!(
                    "Fetched {} records from {resource} (more pages: {})",
                    records.len(),
                    next.is_some()
                );
                Ok(Page { records, next })
            }
            other => Err(unexpected_shape(resource, "a JSON array", &other)),
        }
    }

    /// Fetches a single object.
    pub async fn fetch_one(&self, resource: &Resource) -> Result<Value> {
        let url = self.resource_url(resource)?;
        let (_, body) = self.get_with_retry(resource, &url).await?;
        match body {
            value @ Value::Object(_) => Ok(value),
            other => Err(unexpected_shape(resource, "a JSON object", &other)),
        }
    }

    /// Streams every record of a listing, following continuations.
    pub fn fetch_all<'a>(&'a self, resource: &'a Resource) -> impl Stream<Item = Result<Value>> + 'a {
        stream::try_unfold(
            Some(None),
            move |state: Option<Option<PageToken>>| async move {
                let Some(token) = state else {
                    return Ok::<_, G2GError>(None);
                };
                let page = self.fetch_page(resource, token.as_ref()).await?;
                let records = stream::iter(page.records.into_iter().map(Ok::<Value, G2GError>));
                Ok(Some((records, page.next.map(Some))))
            },
        )
        .try_flatten()
    }

    /// GET with retry on rate limits, server errors and transport failures.
    ///
    /// The body is read inside the loop so a connection dropped mid-body is
    /// retried like any other transport failure.
    async fn get_with_retry(&self, resource: &Resource, url: &Url) -> Result<(HeaderMap, Value)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.auth_request(self.client.get(url.clone()));

            let (status, message, retry_after) = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let status = response.status().as_u16();
                    let headers = response.headers().clone();
                    match response.bytes().await {
                        Ok(body) => return Ok((headers, decode_json(resource, status, &body)?)),
                        Err(e) => (None, format!("failed reading response body: {e}"), None),
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    if !is_transient(status) {
                        let message = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unable to read error response".to_string());
                        return Err(G2GError::FatalFetch {
                            resource: resource.to_string(),
                            status: status.as_u16(),
                            message,
                        });
                    }
                    let retry_after = retry_after(response.headers());
                    let reason = status.canonical_reason().unwrap_or("unknown").to_string();
                    (Some(status.as_u16()), reason, retry_after)
                }
                Err(e) if e.is_builder() => {
                    return Err(G2GError::Config(format!("Invalid request for {resource}: {e}")));
                }
                Err(e) => (None, e.to_string(), None),
            };

            if attempt >= self.retry.max_attempts {
                return Err(G2GError::TransientFetch {
                    resource: resource.to_string(),
                    status,
                    attempts: attempt,
                    message,
                });
            }

            let delay = retry_after
                .unwrap_or_else(|| self.retry.delay_for(attempt))
                .min(self.retry.max_delay);
            warn!(
                "GitLab request for {resource} failed ({message}), retrying in {}ms ({attempt}/{})...",
                delay.as_millis(),
                self.retry.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn decode_json(resource: &Resource, status: u16, body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| G2GError::FatalFetch {
        resource: resource.to_string(),
        status,
        message: format!("invalid JSON body: {e}"),
    })
}

fn unexpected_shape(resource: &Resource, expected: &str, found: &Value) -> G2GError {
    let kind = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    G2GError::FatalFetch {
        resource: resource.to_string(),
        status: 200,
        message: format!("expected {expected}, got {kind}"),
    }
}
