//! In-process `Transport` that records every request it is handed.
//!
//! Token requests are answered with `{"token_type":"bearer","access_token":"<scope>-<n>"}`
//! where `n` counts exchanges, so tests can tell which scope (and which
//! exchange) a bearer header came from. Resource requests get the canned
//! response registered for `"<METHOD> <path>"`, or `200 []`. A scope marked
//! slow sleeps before its token is issued.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use directory_client::query::decode_query;
use directory_client::{ApiClient, ApiError, ClientConfig, Credentials, HttpRequest, HttpResponse, Transport};

pub const BASE_URL: &str = "https://api.test";
pub const READ: &str = "read";
pub const WRITE: &str = "write";

#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
    canned: Mutex<HashMap<String, HttpResponse>>,
    expires_in: Option<u64>,
    slow_scope: Option<(String, Duration)>,
}

impl RecordingTransport {
    pub fn with_expiry(expires_in: u64) -> Self {
        Self {
            expires_in: Some(expires_in),
            ..Default::default()
        }
    }

    pub fn with_slow_token(mut self, scope: &str, delay: Duration) -> Self {
        self.slow_scope = Some((scope.to_string(), delay));
        self
    }

    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.canned.lock().unwrap().insert(
            format!("{method} {path}"),
            HttpResponse {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: body.to_string(),
            },
        );
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn token_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with("/oauth/token"))
            .collect()
    }

    pub fn resource_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !r.path.ends_with("/oauth/token"))
            .collect()
    }

    fn issue_token(&self, scope: &str, exchange: usize) -> HttpResponse {
        let mut token = serde_json::json!({
            "token_type": "bearer",
            "access_token": format!("{scope}-{exchange}"),
        });
        if let Some(expires_in) = self.expires_in {
            token["expires_in"] = expires_in.into();
        }
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: token.to_string(),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let exchange = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.iter().filter(|r| r.path.ends_with("/oauth/token")).count()
        };
        if request.path.ends_with("/oauth/token") {
            let scope = requested_scope(&request);
            if let Some((_, delay)) = self.slow_scope.as_ref().filter(|(slow, _)| *slow == scope) {
                tokio::time::sleep(*delay).await;
            }
            return Ok(self.issue_token(&scope, exchange));
        }

        let path = request.path.trim_start_matches(BASE_URL);
        let path = path.split('?').next().unwrap_or(path);
        let key = format!("{} {path}", request.method.as_str());
        Ok(self
            .canned
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: "[]".to_string(),
            }))
    }
}

fn requested_scope(request: &HttpRequest) -> String {
    let form = decode_query(request.body.as_deref().unwrap_or_default()).unwrap();
    form.into_iter()
        .find(|(k, _)| k == "scope")
        .map(|(_, v)| v)
        .unwrap_or_default()
}

pub fn config() -> ClientConfig {
    ClientConfig::new(Credentials::new(BASE_URL, "c", "s"))
}

pub fn client() -> ApiClient<RecordingTransport> {
    ApiClient::with_transport(config(), RecordingTransport::default())
}
