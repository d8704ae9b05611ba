//! Outbound HTTP plumbing shared by the feed client and the schedule poller.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use thiserror::Error;

/// Failure of a single outbound request.
///
/// A non-success status is reported the same way as a transport error so
/// callers can treat both as one transient failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// GETs `url` and hands back the response whatever its status.
pub async fn send<C: HttpClient>(client: &C, url: &str) -> Result<reqwest::Response, FetchError> {
    let url = url
        .parse::<reqwest::Url>()
        .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    Ok(client.execute(req).await?)
}

async fn fetch<C: HttpClient>(client: &C, url: &str) -> Result<reqwest::Response, FetchError> {
    let resp = send(client, url).await?;
    if !resp.status().is_success() {
        return Err(FetchError::Status(resp.status()));
    }
    Ok(resp)
}

/// GETs `url` and returns the raw body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FetchError> {
    let resp = fetch(client, url).await?;
    Ok(resp.bytes().await?)
}
