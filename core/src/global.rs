//! Process-wide client instance.
//!
//! For callers that cannot thread an [`ApiClient`] handle through their code.
//! `initialize` creates the instance once; later calls return it unchanged,
//! even if given different credentials.

use once_cell::sync::OnceCell;
use tracing::info;

use crate::client::ApiClient;
use crate::config::{ClientConfig, Credentials};
use crate::error::ApiError;

static INSTANCE: OnceCell<ApiClient> = OnceCell::new();

pub fn initialize(base_url: &str, client_id: &str, client_secret: &str) -> Result<&'static ApiClient, ApiError> {
    initialize_with(ClientConfig::new(Credentials::new(base_url, client_id, client_secret)))
}

pub fn initialize_with(config: ClientConfig) -> Result<&'static ApiClient, ApiError> {
    INSTANCE.get_or_try_init(|| {
        info!(base_url = %config.credentials.base_url, "initializing api client");
        ApiClient::new(config)
    })
}

pub fn instance() -> Result<&'static ApiClient, ApiError> {
    INSTANCE.get().ok_or(ApiError::NotInitialized)
}
