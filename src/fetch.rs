//! HTTP fetch layer shared by every resolver
//!
//! One `Fetcher` is built per resolution task. It owns its own connection
//! pool and cookie jar, so nothing leaks between messages. Every request is
//! bounded by the configured timeout.

use crate::error::ResolveError;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, RANGE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request flavour understood by [`Fetcher::fetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    /// GET for the first byte only, for CDNs that reject HEAD
    RangedGet,
}

/// Fully buffered response
#[derive(Debug)]
pub struct FetchResponse {
    pub status: u16,
    /// Final URL after redirects
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON regardless of the declared content type
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResolveError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ResolveError::MalformedUpstreamResponse(format!(
                "Invalid JSON from {}: {}",
                host_of(&self.url),
                e
            ))
        })
    }
}

/// Per-task HTTP session
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    jar: Arc<Jar>,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| {
                ResolveError::FetchFailure(format!("Could not build HTTP client: {}", e))
            })?;

        Ok(Self { client, jar })
    }

    /// Underlying client, for callers that need to stream a body
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Issue one request and buffer the whole body.
    ///
    /// Non-200 statuses are returned, not turned into errors. Network-level
    /// failures (DNS, reset, timeout) surface as `FetchFailure`.
    pub async fn fetch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        method: Method,
    ) -> Result<FetchResponse, ResolveError> {
        let mut request = match method {
            Method::Get | Method::RangedGet => self.client.get(url),
            Method::Head => self.client.head(url),
        };

        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if method == Method::RangedGet {
            request = request.header(RANGE, "bytes=0-0");
        }

        debug!(url = %url, ?method, "fetching");
        let response = request.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let resp_headers = response.headers().clone();
        let body = if method == Method::Head {
            Vec::new()
        } else {
            response.bytes().await?.to_vec()
        };

        debug!(url = %final_url, status, len = body.len(), "fetched");

        Ok(FetchResponse {
            status,
            url: final_url,
            headers: resp_headers,
            body,
        })
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<FetchResponse, ResolveError> {
        self.fetch(url, headers, Method::Get).await
    }

    /// Whether `url` answers 200, trying a one-byte ranged GET when HEAD is
    /// refused with 403/405. Network errors count as "does not exist".
    pub async fn url_exists(&self, url: &str, headers: &[(&str, &str)]) -> bool {
        match self.fetch(url, headers, Method::Head).await {
            Ok(resp) if resp.status == 200 => true,
            Ok(resp) if resp.status == 403 || resp.status == 405 => {
                matches!(
                    self.fetch(url, headers, Method::RangedGet).await,
                    Ok(ranged) if ranged.status == 200
                )
            }
            Ok(_) => false,
            Err(e) => {
                debug!(url = %url, error = %e, "existence check failed");
                false
            }
        }
    }

    /// Follow redirects and return where the chain ends up
    pub async fn expand(&self, url: &str, headers: &[(&str, &str)]) -> Result<Url, ResolveError> {
        let resp = self.fetch(url, headers, Method::Get).await?;
        Ok(resp.url)
    }

    /// Value of cookie `name` that the jar would send to `origin`
    pub fn cookie(&self, origin: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(origin)?;
        let header = header.to_str().ok()?;
        cookie_value(header, name)
    }
}

fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Host of `url` for log and error messages
pub fn host_of(url: &Url) -> &str {
    url.host_str().unwrap_or("upstream")
}

/// Lower-cased host of a URL string, `None` if it does not parse
pub fn host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
