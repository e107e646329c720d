//! Shared request plumbing for the HTTP clients

use ofr_core::FetchError;
use reqwest::{Client, IntoUrl, Response, StatusCode, Url};
use std::time::Duration;

pub(crate) fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent(concat!("ofr/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// GET `url`, mapping transport failures and 429 into [`FetchError`].
/// Other statuses are left for the caller to interpret.
pub(crate) async fn get(client: &Client, url: impl IntoUrl) -> Result<Response, FetchError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    if resp.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }
    Ok(resp)
}

pub(crate) fn ensure_success(resp: &Response) -> Result<(), FetchError> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(FetchError::Http {
            status: resp.status().as_u16(),
        })
    }
}

pub(crate) async fn json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, FetchError> {
    resp.json::<T>()
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// `base` with `segments` appended, each percent-encoded as one path segment
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url =
        Url::parse(base).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidUrl(format!("{}: cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
