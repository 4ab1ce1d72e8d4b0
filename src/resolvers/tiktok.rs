//! TikTok videos and photo slideshows via the tikwm lookup API

use super::{host_is_or_under, Resolver, SiteProfile, CHROME_UA};
use crate::error::ResolveError;
use crate::extract::find_link;
use crate::fetch::Fetcher;
use crate::media::ResolvedMedia;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

const HEADERS: &[(&str, &str)] = &[
    ("User-Agent", CHROME_UA),
    ("Accept-Language", "en-US,en;q=0.9"),
];

pub struct TikTok {
    profile: SiteProfile,
}

impl TikTok {
    pub fn new() -> Self {
        Self::with_profile(Self::default_profile())
    }

    pub fn with_profile(profile: SiteProfile) -> Self {
        Self { profile }
    }

    pub fn default_profile() -> SiteProfile {
        SiteProfile::new(
            HEADERS,
            &["tiktok.com", "www.tiktok.com", "vm.tiktok.com", "m.tiktok.com"],
        )
        .origin("https://www.tiktok.com/")
        .api_endpoint("https://www.tikwm.com/api/")
    }
}

impl Default for TikTok {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<LookupData>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupData {
    images: Option<Vec<SlideImage>>,
    /// watermark-free
    play: Option<String>,
    wmplay: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SlideImage {
    Url(String),
    Object { url: Option<String> },
}

impl SlideImage {
    fn url(&self) -> Option<&str> {
        let url = match self {
            SlideImage::Url(url) => Some(url.as_str()),
            SlideImage::Object { url } => url.as_deref(),
        };
        url.filter(|u| !u.is_empty())
    }
}

#[async_trait]
impl Resolver for TikTok {
    fn name(&self) -> &'static str {
        "tiktok"
    }

    fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn is_link(&self, url: &str) -> bool {
        host_is_or_under(url, &self.profile.domains)
    }

    fn match_text(&self, text: &str) -> Option<String> {
        find_link(text, |u| self.is_link(u))
    }

    async fn resolve(
        &self,
        fetcher: &Fetcher,
        url: &str,
    ) -> Result<Vec<ResolvedMedia>, ResolveError> {
        if !self.is_link(url) {
            return Err(ResolveError::UnsupportedDomain(
                "Invalid link source. Only tiktok.com links are allowed.".to_string(),
            ));
        }

        let api_url = Url::parse_with_params(&self.profile.api_endpoint, &[("url", url)])
            .map_err(|e| {
                ResolveError::MalformedUpstreamResponse(format!("Bad TikTok API endpoint: {}", e))
            })?;

        let resp = fetcher.get(api_url.as_str(), self.profile.headers).await?;
        if !resp.is_ok() {
            return Err(ResolveError::FetchFailure(format!(
                "TikTok API returned HTTP {}",
                resp.status
            )));
        }

        let lookup: LookupResponse = resp.json()?;
        media_from_lookup(lookup)
    }
}

fn media_from_lookup(lookup: LookupResponse) -> Result<Vec<ResolvedMedia>, ResolveError> {
    if lookup.code != Some(0) {
        return Err(ResolveError::FetchFailure(
            lookup.msg.unwrap_or_else(|| "Unknown API error".to_string()),
        ));
    }

    let data = lookup.data.unwrap_or_default();

    if let Some(images) = data.images.as_ref().filter(|i| !i.is_empty()) {
        debug!(count = images.len(), "tiktok slideshow");
        return Ok(images
            .iter()
            .filter_map(SlideImage::url)
            .map(ResolvedMedia::image)
            .collect());
    }

    let play = [data.play, data.wmplay]
        .into_iter()
        .flatten()
        .find(|u| !u.is_empty());
    match play {
        Some(url) => Ok(vec![ResolvedMedia::video(url)]),
        None => Err(ResolveError::NoMediaFound(
            "No video or images found in API response".to_string(),
        )),
    }
}
