//! Per-site link resolvers
//!
//! Each resolver owns one site: it recognises the site's links, fetches
//! whatever the site exposes, and returns the raw media behind the link.

use crate::error::ResolveError;
use crate::fetch::{host, Fetcher};
use crate::media::ResolvedMedia;
use async_trait::async_trait;

pub mod ifunny;
pub mod instagram;
pub mod tiktok;
pub mod twitter;

pub use ifunny::IFunny;
pub use instagram::Instagram;
pub use tiktok::TikTok;
pub use twitter::Twitter;

/// Browser-ish user agent shared by the profiles
pub const CHROME_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Static per-site configuration.
///
/// Production code uses each resolver's `default_profile()`; tests swap in a
/// profile whose domains and endpoints point at a local mock server.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Headers sent with page, API and asset requests
    pub headers: &'static [(&'static str, &'static str)],
    /// Hosts (or host suffixes, depending on the resolver) the site owns
    pub domains: Vec<String>,
    /// Short-link hosts that redirect into `domains`
    pub short_domains: Vec<String>,
    /// Site home, used for cookie lookups and Referer headers
    pub origin: String,
    /// Upstream API the resolver talks to, if any
    pub api_endpoint: String,
}

impl SiteProfile {
    pub fn new(headers: &'static [(&'static str, &'static str)], domains: &[&str]) -> Self {
        Self {
            headers,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            short_domains: Vec::new(),
            origin: String::new(),
            api_endpoint: String::new(),
        }
    }

    pub fn short_domains(mut self, domains: &[&str]) -> Self {
        self.short_domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }
}

/// Capability every site resolver provides.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short site name for logs
    fn name(&self) -> &'static str;

    fn profile(&self) -> &SiteProfile;

    /// Whether the URL's host belongs to this site
    fn is_link(&self, url: &str) -> bool;

    /// Pull this site's URL out of free-form message text
    fn match_text(&self, text: &str) -> Option<String>;

    /// Turn a link into one or more downloadable assets
    async fn resolve(
        &self,
        fetcher: &Fetcher,
        url: &str,
    ) -> Result<Vec<ResolvedMedia>, ResolveError>;
}

/// Host of `url` ends with any of `suffixes`
pub(crate) fn host_ends_with(url: &str, suffixes: &[String]) -> bool {
    match host(url) {
        Some(h) => suffixes.iter().any(|s| h.ends_with(s.as_str())),
        None => false,
    }
}

/// Host of `url` is one of `domains` or a subdomain of one
pub(crate) fn host_is_or_under(url: &str, domains: &[String]) -> bool {
    match host(url) {
        Some(h) => domains
            .iter()
            .any(|d| h == *d || h.ends_with(&format!(".{}", d))),
        None => false,
    }
}

/// Host of `url` is exactly one of `domains`
pub(crate) fn host_in(url: &str, domains: &[String]) -> bool {
    match host(url) {
        Some(h) => domains.iter().any(|d| h == *d),
        None => false,
    }
}
