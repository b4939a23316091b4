//! OAuth2 client-credentials token acquisition.
//!
//! # Design
//! An `Authenticator` is bound to one scope and memoizes the first token it
//! obtains for as long as the instance lives. The exchange is split like
//! every other call in this crate: `build_token_request` produces the
//! request, `parse_token_response` interprets the reply, and `credential`
//! drives the round-trip through a [`Transport`].

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use tracing::debug;

use crate::config::Credentials;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::encode_query;
use crate::transport::Transport;

pub const TOKEN_PATH: &str = "/oauth/token";

/// A token issued by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub token_type: String,
    pub access_token: String,
    /// Lifetime in seconds, when the server reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl AccessToken {
    /// `"{token_type} {access_token}"`.
    pub fn credential(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: Credentials,
    scope: String,
    token: Option<AccessToken>,
}

impl Authenticator {
    pub fn new(credentials: &Credentials, scope: &str) -> Self {
        Self {
            credentials: credentials.clone(),
            scope: scope.to_string(),
            token: None,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn build_token_request(&self) -> HttpRequest {
        let basic = general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));
        let form = encode_query(&[("grant_type", "client_credentials"), ("scope", self.scope.as_str())]);
        HttpRequest {
            method: HttpMethod::Post,
            path: format!("{}{TOKEN_PATH}", self.credentials.base_url),
            headers: vec![
                ("authorization".to_string(), format!("Basic {basic}")),
                (
                    "content-type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
            ],
            body: Some(form),
        }
    }

    pub fn parse_token_response(response: HttpResponse) -> Result<AccessToken, ApiError> {
        if !response.is_success() {
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        let parsed: Option<AccessToken> = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Protocol(format!("unreadable token response: {e}")))?;
        parsed.ok_or_else(|| ApiError::Protocol("token response was empty".to_string()))
    }

    /// The token for this scope, exchanging credentials on first use only.
    pub async fn token<T>(&mut self, transport: &T) -> Result<&AccessToken, ApiError>
    where
        T: Transport + ?Sized,
    {
        if self.token.is_none() {
            debug!(scope = %self.scope, "requesting client-credentials token");
            let response = transport.execute(self.build_token_request()).await?;
            let token = Self::parse_token_response(response)?;
            self.token = Some(token);
        }
        self.token
            .as_ref()
            .ok_or_else(|| ApiError::Protocol("token cache empty after exchange".to_string()))
    }

    /// The bearer credential `"{token_type} {access_token}"` for this scope.
    pub async fn credential<T>(&mut self, transport: &T) -> Result<String, ApiError>
    where
        T: Transport + ?Sized,
    {
        self.token(transport).await.map(AccessToken::credential)
    }
}
