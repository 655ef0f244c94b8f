//! Authenticated REST transport with retry and error classification.

use std::fmt::Display;
use std::time::Duration;

use community::ChatError;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Discord REST API root.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries after a 429, or after a 5xx or network failure on an idempotent
/// request.
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// JSON error code returned when a user does not accept DMs from the bot.
const CANNOT_MESSAGE_USER: u64 = 50007;

/// JSON error code for edits that hit the role hierarchy.
const MISSING_PERMISSIONS: u64 = 50013;

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

pub(crate) struct RestClient {
    http: Client,
    base: Url,
    token: String,
}

impl RestClient {
    pub fn new(base: &str, token: String) -> Result<Self, ChatError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| platform(format!("failed to build HTTP client: {e}")))?;
        let base = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| platform(format!("invalid API base '{base}': {e}")))?;
        Ok(Self { http, base, token })
    }

    /// Appends percent-encoded path segments to the API base.
    pub fn url(&self, segments: &[&dyn Display]) -> Result<Url, ChatError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| platform("API base cannot carry a path"))?
            .pop_if_empty()
            .extend(segments.iter().map(|s| s.to_string()));
        Ok(url)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ChatError> {
        let response = self.execute(self.request(Method::GET, url)).await?;
        decode(response).await
    }

    pub async fn send_json<B, T>(&self, method: Method, url: Url, body: &B) -> Result<T, ChatError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(self.request(method, url).json(body)).await?;
        decode(response).await
    }

    /// Sends a request whose success response carries no body (204).
    pub async fn send_empty(&self, request: RequestBuilder) -> Result<(), ChatError> {
        self.execute(request).await.map(drop)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ChatError> {
        let request = request
            .build()
            .map_err(|e| platform(format!("invalid request: {e}")))?;
        let repeatable = is_idempotent(request.method());
        let mut attempt = 0;
        loop {
            attempt += 1;
            let pending = request
                .try_clone()
                .ok_or_else(|| platform("request cannot be cloned for retry"))?;

            match self.http.execute(pending).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(status = status.as_u16(), url = %response.url(), "discord response");
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt <= MAX_RETRIES && status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = retry_after(response).await;
                        warn!(attempt, wait_ms = wait.as_millis() as u64, "rate limited, will retry");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    if repeatable && attempt <= MAX_RETRIES && status.is_server_error() {
                        warn!(attempt, status = status.as_u16(), "server error, will retry");
                        tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify(status, &body));
                }
                Err(e)
                    if repeatable && attempt <= MAX_RETRIES && !e.is_timeout() && !e.is_builder() =>
                {
                    warn!(attempt, error = %e, "network error, will retry");
                    tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                }
                Err(e) => return Err(platform(format!("request failed: {e}"))),
            }
        }
    }
}

/// Requests that may be sent again after a 5xx or a network failure. A
/// `POST` is only resent after a 429.
pub(crate) fn is_idempotent(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::PUT, Method::DELETE, Method::PATCH].contains(method)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ChatError> {
    response
        .json()
        .await
        .map_err(|e| platform(format!("malformed response: {e}")))
}

async fn retry_after(response: Response) -> Duration {
    response
        .json::<RateLimitBody>()
        .await
        .ok()
        .and_then(|body| Duration::try_from_secs_f64(body.retry_after).ok())
        .unwrap_or(INITIAL_BACKOFF)
}

/// Maps a failed response onto the port's error taxonomy.
pub(crate) fn classify(status: StatusCode, body: &str) -> ChatError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        status.to_string()
    } else {
        parsed.message
    };
    match (status, parsed.code) {
        (StatusCode::NOT_FOUND, _) => ChatError::NotFound { what: message },
        (StatusCode::FORBIDDEN, _) | (_, CANNOT_MESSAGE_USER) | (_, MISSING_PERMISSIONS) => {
            ChatError::Forbidden { reason: message }
        }
        _ => platform(format!("{status}: {message}")),
    }
}

pub(crate) fn platform(message: impl Into<String>) -> ChatError {
    ChatError::Platform {
        message: message.into(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::response::IntoResponse;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[test]
    fn missing_objects_become_not_found() {
        let err = classify(
            StatusCode::NOT_FOUND,
            r#"{"message": "Unknown Message", "code": 10008}"#,
        );
        assert!(matches!(err, ChatError::NotFound { what } if what == "Unknown Message"));
    }

    #[test]
    fn closed_dms_are_forbidden_whatever_the_status() {
        let body = r#"{"message": "Cannot send messages to this user", "code": 50007}"#;
        assert!(classify(StatusCode::FORBIDDEN, body).is_forbidden());
        assert!(classify(StatusCode::BAD_REQUEST, body).is_forbidden());
    }

    #[test]
    fn other_failures_keep_the_status() {
        let err = classify(StatusCode::BAD_REQUEST, "not json");
        let ChatError::Platform { message } = err else {
            panic!("expected a platform error");
        };
        assert!(message.starts_with("400"), "{message}");
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let client = RestClient::new("https://discord.test/api/v10/", "t".into()).unwrap();
        let url = client
            .url(&[&"channels", &7u64, &"messages", &8u64, &"reactions", &"\u{1F44D}", &"@me"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://discord.test/api/v10/channels/7/messages/8/reactions/%F0%9F%91%8D/@me"
        );
    }

    #[test]
    fn only_idempotent_methods_are_retried_blindly() {
        assert!(is_idempotent(&Method::GET));
        assert!(is_idempotent(&Method::PUT));
        assert!(is_idempotent(&Method::DELETE));
        assert!(is_idempotent(&Method::PATCH));
        assert!(!is_idempotent(&Method::POST));
    }

    #[tokio::test]
    async fn failed_creations_are_sent_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let base = serve(Router::new().fallback(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::BAD_GATEWAY
            }
        }))
        .await;
        let client = RestClient::new(&base, "t".into()).unwrap();
        let url = client.url(&[&"guilds", &1u64, &"roles"]).unwrap();

        let created: Result<Value, _> = client
            .send_json(Method::POST, url, &json!({"name": "idea-board"}))
            .await;

        assert!(created.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_creations_are_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let base = serve(Router::new().fallback(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    let body = json!({"message": "You are being rate limited.", "retry_after": 0.0});
                    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
                } else {
                    Json(json!({"id": "5"})).into_response()
                }
            }
        }))
        .await;
        let client = RestClient::new(&base, "t".into()).unwrap();
        let url = client.url(&[&"guilds", &1u64, &"roles"]).unwrap();

        let created: Value = client
            .send_json(Method::POST, url, &json!({"name": "idea-board"}))
            .await
            .unwrap();

        assert_eq!(created["id"], "5");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
