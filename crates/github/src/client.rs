//! Authenticated GitHub REST transport.

use std::fmt::Display;
use std::time::Duration;

use community::SourceHostError;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const AGENT: &str = concat!("ideaforge/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

pub(crate) struct RestClient {
    http: Client,
    base: Url,
    token: String,
}

impl RestClient {
    pub fn new(base: &str, token: String) -> Result<Self, SourceHostError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| api(format!("failed to build HTTP client: {e}")))?;
        let base = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| api(format!("invalid API base '{base}': {e}")))?;
        Ok(Self { http, base, token })
    }

    pub fn url(&self, segments: &[&dyn Display]) -> Result<Url, SourceHostError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| api("API base cannot carry a path"))?
            .pop_if_empty()
            .extend(segments.iter().map(|s| s.to_string()));
        Ok(url)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, AGENT)
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceHostError> {
        let response = self.execute(self.request(Method::GET, url)).await?;
        decode(response).await
    }

    pub async fn send_json<B, T>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, SourceHostError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(self.request(method, url).json(body)).await?;
        decode(response).await
    }

    pub async fn send_empty(&self, request: RequestBuilder) -> Result<(), SourceHostError> {
        self.execute(request).await.map(drop)
    }

    /// Sends `request`, retrying server and network failures of idempotent
    /// requests. Any 2xx is returned as is so callers can tell 200 from 202.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, SourceHostError> {
        let request = request
            .build()
            .map_err(|e| api(format!("invalid request: {e}")))?;
        let repeatable = is_idempotent(request.method());
        let mut attempt = 0;
        loop {
            attempt += 1;
            let pending = request
                .try_clone()
                .ok_or_else(|| api("request cannot be cloned for retry"))?;

            match self.http.execute(pending).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(status = status.as_u16(), url = %response.url(), "github response");
                    if status.is_success() {
                        return Ok(response);
                    }
                    if repeatable && attempt <= MAX_RETRIES && status.is_server_error() {
                        warn!(attempt, status = status.as_u16(), "server error, will retry");
                        tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                        continue;
                    }
                    let path = response.url().path().to_string();
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify(status, &path, &body));
                }
                Err(e)
                    if repeatable && attempt <= MAX_RETRIES && !e.is_timeout() && !e.is_builder() =>
                {
                    warn!(attempt, error = %e, "network error, will retry");
                    tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                }
                Err(e) => return Err(api(format!("request failed: {e}"))),
            }
        }
    }
}

/// `POST` creates teams and repositories and is never resent.
fn is_idempotent(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::PUT, Method::DELETE, Method::PATCH].contains(method)
}

pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SourceHostError> {
    response
        .json()
        .await
        .map_err(|e| api(format!("malformed response: {e}")))
}

pub(crate) fn classify(status: StatusCode, path: &str, body: &str) -> SourceHostError {
    if status == StatusCode::NOT_FOUND {
        return SourceHostError::NotFound {
            what: path.to_string(),
        };
    }
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    api(format!("{status} on {path}: {}", parsed.message))
}

pub(crate) fn api(message: impl Into<String>) -> SourceHostError {
    SourceHostError::Api {
        message: message.into(),
    }
}
