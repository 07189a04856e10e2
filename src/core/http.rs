//! HTTP plumbing shared by the geocoder and the router
//!
//! Builds the `reqwest` client from [`ServiceConfig`] and retries requests that
//! fail at the network level with exponential backoff.

use std::time::Duration;

use log::warn;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;

use crate::core::config::ServiceConfig;
use crate::core::error::{Error, Result, TransportError};
use crate::core::router::INVALID_COORDINATE_MESSAGE;

/// Create the HTTP client used for every service request
pub fn build_client(config: &ServiceConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| Error::InvalidInput(format!("cannot build HTTP client: {e}")))
}

/// Execute an operation, retrying network errors with exponential backoff
///
/// Delays are `base_retry_delay * 2^(attempt - 1)`. HTTP-level errors are
/// returned immediately.
pub async fn retry_on_network_error<F, Fut, T>(
    config: &ServiceConfig,
    operation: F,
) -> std::result::Result<T, TransportError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, TransportError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(TransportError::Network(msg)) if attempt < config.max_retries => {
                attempt += 1;
                let delay = backoff_delay(config, attempt);
                warn!("Network error (attempt {attempt}): {msg}. Retrying in {delay:?}...");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delay before retry number `attempt` (1-based), saturating on overflow
fn backoff_delay(config: &ServiceConfig, attempt: u32) -> Duration {
    config
        .base_retry_delay
        .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// GET `url` and decode the body as JSON
///
/// Routers answer some client errors with a JSON body that callers need to
/// inspect, so the status is returned next to the payload. Server errors and
/// rate limiting are network failures whatever the body, except for the
/// router's invalid-coordinate answer.
pub async fn get_json(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> std::result::Result<(StatusCode, Value), TransportError> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    let body = response.text().await?;

    let unavailable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;

    match serde_json::from_str::<Value>(&body) {
        Ok(value) if unavailable && value["message"] != INVALID_COORDINATE_MESSAGE => Err(
            TransportError::Network(format!("service unavailable: {status}")),
        ),
        Ok(value) => Ok((status, value)),
        Err(_) if unavailable => {
            Err(TransportError::Network(format!("service unavailable: {status}")))
        }
        Err(e) => Err(TransportError::Http(format!(
            "unexpected response ({status}): {e}"
        ))),
    }
}
