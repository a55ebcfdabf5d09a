//! Blocking HTTP for backends that talk to web APIs

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Largest body accepted from a download (release assets are binaries)
const MAX_DOWNLOAD_SIZE: u64 = 200 * 1024 * 1024;

const USER_AGENT: &str = concat!("packward/", env!("CARGO_PKG_VERSION"));

/// GET `url` and decode the JSON body
pub fn get_json<T: DeserializeOwned>(url: &str, headers: &[(&str, &str)]) -> Result<T> {
    log::debug!("GET {url}");
    let agent = ureq::Agent::new_with_defaults();

    let mut request = agent.get(url).header("User-Agent", USER_AGENT);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    request
        .call()
        .with_context(|| format!("Request to {url} failed"))?
        .body_mut()
        .read_json()
        .with_context(|| format!("Unexpected response from {url}"))
}

/// Download a file into memory
pub fn download(url: &str) -> Result<Vec<u8>> {
    log::debug!("Downloading {url}");
    let agent = ureq::Agent::new_with_defaults();

    let mut response = agent
        .get(url)
        .header("User-Agent", USER_AGENT)
        .call()
        .with_context(|| format!("Failed to download {url}"))?;

    response
        .body_mut()
        .with_config()
        .limit(MAX_DOWNLOAD_SIZE)
        .read_to_vec()
        .context("Failed to read response body")
}
