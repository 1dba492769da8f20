//! HTTP transport and the authenticated-request wrapper.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use campusdrive_common::{Error, Result};

use crate::auth::TokenProvider;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Bytes { content_type: String, data: Bytes },
}

/// A remote call, independent of any particular HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            url: url.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: RequestBody::Json(body),
        }
    }

    pub fn put_bytes(
        url: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            method: Method::PUT,
            url: url.into(),
            body: RequestBody::Bytes {
                content_type: content_type.into(),
                data: data.into(),
            },
        }
    }
}

/// Status and raw body of a completed remote call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response with a JSON body.
    pub fn json_body(status: StatusCode, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can issue a request with a bearer token attached.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    ///
    /// Any HTTP status is a successful send; only failures to obtain a
    /// response are errors.
    ///
    /// # Errors
    /// - `Error::Transport` if no response was received
    async fn send(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse>;
}

/// Transport backed by `reqwest`.
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh HTTP client.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("campusdrive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .bearer_auth(bearer);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Bytes { content_type, data } => builder
                .header(header::CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        };

        let response = builder.send().await.map_err(|e| {
            Error::Transport(format!("{} {} failed: {}", request.method, request.url, e))
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(ApiResponse { status, body })
    }
}

/// Wraps a transport with bearer-token handling.
///
/// Every call gets the provider's current token. A 401 answer triggers
/// exactly one forced re-authentication followed by exactly one resend;
/// whatever that resend returns is final.
#[derive(Clone)]
pub struct AuthorizedTransport {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
}

impl AuthorizedTransport {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { transport, tokens }
    }

    /// The token provider used for this transport.
    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Issue a request, re-authenticating once on 401.
    ///
    /// # Errors
    /// - `Error::Authentication` if the token provider fails
    /// - `Error::Transport` if no response was received
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let token = self.tokens.get_token(false).await?;
        let response = self.transport.send(request, &token.access_token).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(
            "{} {} returned 401, re-authenticating",
            request.method, request.url
        );
        let token = self.tokens.get_token(true).await?;
        let response = self.transport.send(request, &token.access_token).await?;
        debug!("Retry finished with status {}", response.status);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use std::sync::Mutex;

    /// Replays a fixed list of statuses and records the bearer of each call.
    struct Scripted {
        statuses: Mutex<Vec<StatusCode>>,
        bearers: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(statuses: &[StatusCode]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().rev().copied().collect()),
                bearers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _request: &ApiRequest, bearer: &str) -> Result<ApiResponse> {
            self.bearers.lock().unwrap().push(bearer.to_string());
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(StatusCode::UNAUTHORIZED);
            Ok(ApiResponse::new(status, "{}"))
        }
    }

    #[tokio::test]
    async fn test_success_does_not_reauthenticate() {
        let transport = Arc::new(Scripted::new(&[StatusCode::OK]));
        let tokens = Arc::new(StaticTokenProvider::new("tok"));
        let authorized = AuthorizedTransport::new(transport.clone(), tokens.clone());

        let response = authorized.execute(&ApiRequest::get("http://x/a")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(tokens.reauth_count(), 0);
        assert_eq!(*transport.bearers.lock().unwrap(), vec!["tok"]);
    }

    #[tokio::test]
    async fn test_single_retry_with_new_token() {
        let transport = Arc::new(Scripted::new(&[StatusCode::UNAUTHORIZED, StatusCode::OK]));
        let tokens = Arc::new(StaticTokenProvider::new("tok"));
        let authorized = AuthorizedTransport::new(transport.clone(), tokens.clone());

        let response = authorized.execute(&ApiRequest::get("http://x/a")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(tokens.reauth_count(), 1);
        assert_eq!(*transport.bearers.lock().unwrap(), vec!["tok", "tok-1"]);
    }

    #[tokio::test]
    async fn test_never_more_than_two_attempts() {
        let transport = Arc::new(Scripted::new(&[]));
        let tokens = Arc::new(StaticTokenProvider::new("tok"));
        let authorized = AuthorizedTransport::new(transport.clone(), tokens.clone());

        let response = authorized.execute(&ApiRequest::get("http://x/a")).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(transport.bearers.lock().unwrap().len(), 2);
        assert_eq!(tokens.reauth_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_reauth_propagates() {
        let transport = Arc::new(Scripted::new(&[StatusCode::UNAUTHORIZED, StatusCode::OK]));
        let tokens = Arc::new(StaticTokenProvider::new("tok").failing_reauth());
        let authorized = AuthorizedTransport::new(transport.clone(), tokens);

        let result = authorized.execute(&ApiRequest::get("http://x/a")).await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(transport.bearers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_not_retried() {
        let transport = Arc::new(Scripted::new(&[StatusCode::INTERNAL_SERVER_ERROR]));
        let tokens = Arc::new(StaticTokenProvider::new("tok"));
        let authorized = AuthorizedTransport::new(transport.clone(), tokens.clone());

        let response = authorized.execute(&ApiRequest::get("http://x/a")).await.unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(transport.bearers.lock().unwrap().len(), 1);
        assert_eq!(tokens.reauth_count(), 0);
    }
}
