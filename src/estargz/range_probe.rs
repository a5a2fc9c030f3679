//! Probing whether a URL's server honors HTTP range requests (spec §4.6).

use std::time::Duration;

use log::debug;
use reqwest::Client;
use reqwest::StatusCode;

/// How long to wait for the probe request before assuming no range support.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends `Range: bytes=0-0` to `url` and returns whether the server replied
/// `206 Partial Content`. Any other status, a timeout, or a transport error
/// is treated as "no range support" rather than propagated, since the
/// fallback (a full buffered pull) is always available to the caller.
pub async fn supports_range(client: &Client, url: &str) -> bool {
    let result = tokio::time::timeout(
        PROBE_TIMEOUT,
        client.get(url).header(reqwest::header::RANGE, "bytes=0-0").send(),
    )
    .await;

    match result {
        Ok(Ok(resp)) => {
            let supported = resp.status() == StatusCode::PARTIAL_CONTENT;
            debug!("estargz: range probe for {url} -> {} (supported={supported})", resp.status());
            supported
        }
        Ok(Err(e)) => {
            debug!("estargz: range probe for {url} failed: {e}");
            false
        }
        Err(_) => {
            debug!("estargz: range probe for {url} timed out after {PROBE_TIMEOUT:?}");
            false
        }
    }
}
