//! Authenticated async client for the directory service.
//!
//! # Overview
//! The service exposes zip-code and user resources behind OAuth2
//! client-credentials authorization, with a scope required per operation.
//! [`ApiClient`] obtains a token for each operation's scope through an
//! [`Authenticator`], attaches it to the request and dispatches it through a
//! [`Transport`].
//!
//! # Design
//! - Requests and responses are plain data (`http`), so builders are pure
//!   and the network sits behind one trait (`transport`).
//! - Tokens are cached per scope with expiry and attached per request.
//! - Resource responses are returned to the caller as-is; status codes are
//!   the caller's to interpret. Write failures can optionally be rewritten
//!   into synthetic responses, see [`FailurePolicy`].
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod global;
pub mod http;
pub mod query;
pub mod transport;
pub mod types;

pub use auth::{AccessToken, Authenticator};
pub use client::{parse_users, parse_zip_codes, ApiClient};
pub use config::{ClientConfig, Credentials, FailurePolicy};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{ReqwestTransport, Transport};
pub use types::{User, UserUpdate, ZipCode};
