//! Shared HTTP plumbing for the external adapters
//!
//! Each adapter maps the string reason returned here onto its own error
//! variant, so a timeout, a non-2xx status and a malformed body all surface
//! as one transient failure of that adapter.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Per-call timeout applied to every external query
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const USER_AGENT: &str = concat!("validator-version-sync/", env!("CARGO_PKG_VERSION"));

/// Build a client with a bounded per-request timeout
pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::config("http", e.to_string()))
}

/// GET a URL and decode the JSON body
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> std::result::Result<T, String> {
    let response = request.send().await.map_err(|e| e.to_string())?;
    decode(response).await
}

/// POST a JSON body and decode the JSON response
pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> std::result::Result<T, String>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> std::result::Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        return Err(format!("unexpected status {status}"));
    }
    let body = response.bytes().await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&body).map_err(|e| format!("failed to decode response: {e}"))
}
