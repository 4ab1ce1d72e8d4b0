//! iFunny meme pages
//!
//! The share message carries a fixed marker followed by the link. The page
//! itself lists several renditions of the meme; a gif is preferred because
//! it autoplays inline in chat clients.

use super::{host_ends_with, Resolver, SiteProfile};
use crate::error::ResolveError;
use crate::extract::extract_media_candidates;
use crate::fetch::Fetcher;
use crate::media::ResolvedMedia;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;
use url::Url;

/// Prefix iFunny puts in front of shared links
pub const SHARE_MARKER: &str = "Tap to see the meme -";

/// gif-twin existence checks in flight at once
const CHECK_CONCURRENCY: usize = 4;

const HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Referer", "https://ifunny.co/"),
];

pub struct IFunny {
    profile: SiteProfile,
}

impl IFunny {
    pub fn new() -> Self {
        Self::with_profile(Self::default_profile())
    }

    pub fn with_profile(profile: SiteProfile) -> Self {
        Self { profile }
    }

    pub fn default_profile() -> SiteProfile {
        SiteProfile::new(HEADERS, &["ifunny.co"]).origin("https://ifunny.co/")
    }
}

impl Default for IFunny {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for IFunny {
    fn name(&self) -> &'static str {
        "ifunny"
    }

    fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn is_link(&self, url: &str) -> bool {
        host_ends_with(url, &self.profile.domains)
    }

    fn match_text(&self, text: &str) -> Option<String> {
        let rest = text.strip_prefix(SHARE_MARKER)?.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    async fn resolve(
        &self,
        fetcher: &Fetcher,
        url: &str,
    ) -> Result<Vec<ResolvedMedia>, ResolveError> {
        if !self.is_link(url) {
            return Err(ResolveError::UnsupportedDomain(
                "Invalid link source. Only ifunny.co links are allowed.".to_string(),
            ));
        }
        let page_url = Url::parse(url)
            .map_err(|e| ResolveError::UnrecognizedUrlFormat(format!("Invalid meme link: {}", e)))?;

        let headers = self.profile.headers;
        let page = fetcher.get(url, headers).await?;
        if !page.is_ok() {
            return Err(ResolveError::FetchFailure(format!(
                "Failed to fetch meme page: {}",
                page.status
            )));
        }

        let candidates = extract_media_candidates(&page.text(), &page_url);
        debug!(url = %url, candidates = candidates.len(), "collected meme candidates");

        let chosen = choose_preferred(candidates.as_slice(), |gif| async move {
            fetcher.url_exists(&gif, headers).await
        })
        .await;

        match chosen {
            Some(media) => Ok(vec![ResolvedMedia::unclassified(media)]),
            None => Err(ResolveError::NoMediaFound(
                "Could not find meme in the link.".to_string(),
            )),
        }
    }
}

/// Pick the best rendition from page-ordered candidates.
///
/// Priority: a gif; the gif twin of an mp4 that `exists` confirms exists; the
/// first mp4; the first webm; the first candidate. Checks run concurrently
/// but results are consumed in candidate order and the first hit wins.
pub async fn choose_preferred<F, Fut>(candidates: &[String], exists: F) -> Option<String>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = bool>,
{
    let first = candidates.first()?;

    if let Some(gif) = candidates.iter().find(|u| ends_with_ignore_case(u, ".gif")) {
        return Some(gif.clone());
    }

    let twins: Vec<String> = candidates
        .iter()
        .filter(|u| ends_with_ignore_case(u, ".mp4"))
        .map(|u| format!("{}.gif", &u[..u.len() - 4]))
        .collect();

    let checks = stream::iter(twins)
        .map(|gif| {
            let check = exists(gif.clone());
            async move { (gif, check.await) }
        })
        .buffered(CHECK_CONCURRENCY);
    let mut checks = std::pin::pin!(checks);
    while let Some((gif, found)) = checks.next().await {
        if found {
            return Some(gif);
        }
    }

    for ext in [".mp4", ".webm"] {
        if let Some(found) = candidates.iter().find(|u| ends_with_ignore_case(u, ext)) {
            return Some(found.clone());
        }
    }

    Some(first.clone())
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
