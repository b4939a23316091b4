//! Scope-gated client for the directory API.
//!
//! # Design
//! Every operation is split into a `build_*` method that produces an
//! unauthenticated `HttpRequest` and an async method that authorizes and
//! dispatches it. A missing payload is rejected in the builder, so it fails
//! before any token exchange or request is made. Payload contents are not
//! checked; the service answers for those.
//!
//! Tokens are cached per scope inside the client and attached to each
//! request individually. Nothing on the shared connection is mutated, so
//! operations with different scopes can run concurrently on one client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::config::{ClientConfig, FailurePolicy};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::append_query;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{User, UserUpdate, ZipCode};

#[derive(Debug, Clone)]
struct CachedToken {
    bearer: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// One lock per scope, held across that scope's exchange.
type TokenSlot = Arc<Mutex<Option<CachedToken>>>;

pub struct ApiClient<T = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
    tokens: Mutex<HashMap<String, TokenSlot>>,
}

impl ApiClient<ReqwestTransport> {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn slot(&self, scope: &str) -> TokenSlot {
        let mut slots = self.tokens.lock().await;
        slots.entry(scope.to_string()).or_default().clone()
    }

    /// The `Authorization` header value for `scope`.
    ///
    /// Reuses a cached token while it is fresh; otherwise runs a
    /// client-credentials exchange through a new [`Authenticator`]. The
    /// scope's lock is held across the exchange so concurrent callers share
    /// one token, while other scopes proceed independently.
    pub async fn ensure_scope(&self, scope: &str) -> Result<String, ApiError> {
        let slot = self.slot(scope).await;
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.bearer.clone());
            }
            debug!(scope, "cached token expired");
        }

        let mut authenticator = Authenticator::new(&self.config.credentials, scope);
        let token = authenticator.token(&self.transport).await?;
        let bearer = bearer_header(&token.credential())?;
        // A lifetime too large to represent is treated as no expiry.
        let skew = self.config.token_expiry_skew;
        let expires_at = token
            .expires_in
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs).saturating_sub(skew)));

        *cached = Some(CachedToken {
            bearer: bearer.clone(),
            expires_at,
        });
        Ok(bearer)
    }

    /// Drop the cached token for `scope`; the next operation re-authenticates.
    pub async fn evict_scope(&self, scope: &str) {
        let slot = self.slot(scope).await;
        *slot.lock().await = None;
    }

    async fn authorize(&self, scope: &str, mut request: HttpRequest) -> Result<HttpRequest, ApiError> {
        let bearer = self.ensure_scope(scope).await?;
        request.headers.push(("authorization".to_string(), bearer));
        Ok(request)
    }

    async fn execute(&self, scope: &str, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self.transport.execute(request).await?;
        if response.status == 401 {
            warn!(scope, "token rejected, evicting cached token");
            self.evict_scope(scope).await;
        }
        Ok(response)
    }

    async fn send(&self, scope: &str, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let request = self.authorize(scope, request).await?;
        self.execute(scope, request).await
    }

    /// Dispatch a write and apply the configured [`FailurePolicy`].
    /// Token acquisition failures always propagate.
    async fn send_write(&self, scope: &str, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let request = self.authorize(scope, request).await?;
        let method = request.method;
        let outcome = self.execute(scope, request).await;

        if self.config.failure_policy == FailurePolicy::Passthrough {
            return outcome;
        }
        match outcome {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => {
                let message = failure_message(&response);
                warn!(method = method.as_str(), status = response.status, "write failed, returning synthetic response");
                Ok(HttpResponse::synthetic(message))
            }
            Err(ApiError::Transport(err)) => {
                warn!(method = method.as_str(), error = %err, "write failed, returning synthetic response");
                Ok(HttpResponse::synthetic(format!("Request failed: {err}")))
            }
            Err(other) => Err(other),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.credentials.base_url)
    }

    pub fn build_expand_zip_codes(&self, codes: &[ZipCode]) -> Result<HttpRequest, ApiError> {
        json_request(HttpMethod::Post, self.url("/zip-codes/expand"), codes)
    }

    pub fn build_get_zip_codes(&self) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.url("/zip-codes"),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn build_create_user(&self, user: Option<&User>) -> Result<HttpRequest, ApiError> {
        let user = require(user, "user")?;
        json_request(HttpMethod::Post, self.url("/users"), user)
    }

    pub fn build_get_users(&self, params: &[(&str, &str)]) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: append_query(&self.url("/users"), params),
            headers: Vec::new(),
            body: None,
        }
    }

    /// `partial` selects `PATCH`; otherwise the update is sent as `PUT`.
    pub fn build_update_user(&self, update: Option<&UserUpdate>, partial: bool) -> Result<HttpRequest, ApiError> {
        let update = require(update, "user update")?;
        let method = if partial { HttpMethod::Patch } else { HttpMethod::Put };
        json_request(method, self.url("/users"), update)
    }

    pub fn build_delete_user(&self, user: Option<&User>) -> Result<HttpRequest, ApiError> {
        let user = require(user, "user")?;
        json_request(HttpMethod::Delete, self.url("/users"), user)
    }

    /// `POST /zip-codes/expand`. The raw response is returned whatever its status.
    pub async fn expand_zip_codes(&self, scope: &str, codes: &[ZipCode]) -> Result<HttpResponse, ApiError> {
        let request = self.build_expand_zip_codes(codes)?;
        self.send(scope, request).await
    }

    /// `GET /zip-codes`. The raw response is returned whatever its status.
    pub async fn get_zip_codes(&self, scope: &str) -> Result<HttpResponse, ApiError> {
        self.send(scope, self.build_get_zip_codes()).await
    }

    pub async fn create_user(&self, scope: &str, user: Option<&User>) -> Result<HttpResponse, ApiError> {
        let request = self.build_create_user(user)?;
        self.send_write(scope, request).await
    }

    /// Create each user in order, awaiting every request before the next.
    pub async fn create_users(&self, scope: &str, users: &[User]) -> Result<Vec<HttpResponse>, ApiError> {
        let mut responses = Vec::with_capacity(users.len());
        for user in users {
            responses.push(self.create_user(scope, Some(user)).await?);
        }
        Ok(responses)
    }

    /// `GET /users`, with `params` appended as the query string in the given order.
    pub async fn get_users(&self, scope: &str, params: &[(&str, &str)]) -> Result<HttpResponse, ApiError> {
        self.send(scope, self.build_get_users(params)).await
    }

    pub async fn update_user(
        &self,
        scope: &str,
        update: Option<&UserUpdate>,
        partial: bool,
    ) -> Result<HttpResponse, ApiError> {
        let request = self.build_update_user(update, partial)?;
        self.send_write(scope, request).await
    }

    pub async fn delete_user(&self, scope: &str, user: Option<&User>) -> Result<HttpResponse, ApiError> {
        let request = self.build_delete_user(user)?;
        self.send_write(scope, request).await
    }
}

pub fn parse_users(response: &HttpResponse) -> Result<Vec<User>, ApiError> {
    check_success(response)?;
    response.json()
}

pub fn parse_zip_codes(response: &HttpResponse) -> Result<Vec<ZipCode>, ApiError> {
    check_success(response)?;
    response.json()
}

fn check_success(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

fn require<'a, P>(payload: Option<&'a P>, what: &str) -> Result<&'a P, ApiError> {
    payload.ok_or_else(|| ApiError::InvalidArgument(format!("{what} payload is required")))
}

fn json_request<B: Serialize + ?Sized>(method: HttpMethod, path: String, body: &B) -> Result<HttpRequest, ApiError> {
    let body = serde_json::to_string(body).map_err(|e| ApiError::SerializationError(e.to_string()))?;
    Ok(HttpRequest {
        method,
        path,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Some(body),
    })
}

/// Keep the token portion of `"{type} {token}"` under the `Bearer` scheme.
fn bearer_header(credential: &str) -> Result<String, ApiError> {
    credential
        .split_once(' ')
        .map(|(_, token)| format!("Bearer {token}"))
        .ok_or_else(|| ApiError::Protocol(format!("credential has no token part: {credential:?}")))
}

/// Status rendered as a single word (`FailedDependency`, `NotFound`), or the
/// bare code when it has no registered reason.
fn status_name(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(|reason| reason.chars().filter(char::is_ascii_alphanumeric).collect())
        .unwrap_or_else(|| status.to_string())
}

fn failure_message(response: &HttpResponse) -> String {
    format!(
        "Request failed with status code {}. Response content: {}",
        status_name(response.status),
        response.body
    )
}
