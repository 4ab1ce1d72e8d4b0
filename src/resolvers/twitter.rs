//! Twitter / X posts via the fxtwitter read-only mirror
//!
//! The mirror mounts the same paths as the site, so `/<user>/status/<id>`
//! maps straight onto `https://api.fxtwitter.com/<user>/status/<id>`.
//! `t.co` short links are expanded first.

use super::{host_in, Resolver, SiteProfile, CHROME_UA};
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

pub struct Twitter {
    profile: SiteProfile,
}

impl Twitter {
    pub fn new() -> Self {
        Self::with_profile(Self::default_profile())
    }

    pub fn with_profile(profile: SiteProfile) -> Self {
        Self { profile }
    }

    pub fn default_profile() -> SiteProfile {
        SiteProfile::new(HEADERS, &["twitter.com", "www.twitter.com", "x.com", "www.x.com"])
            .short_domains(&["t.co", "www.t.co"])
            .origin("https://x.com/")
            .api_endpoint("https://api.fxtwitter.com")
    }

    fn is_short_link(&self, url: &str) -> bool {
        host_in(url, &self.profile.short_domains)
    }

    fn is_primary(&self, url: &str) -> bool {
        host_in(url, &self.profile.domains)
    }

    /// Mirror API URL for a canonical post URL
    fn api_url(&self, post: &Url) -> String {
        format!(
            "{}{}",
            self.profile.api_endpoint.trim_end_matches('/'),
            post.path()
        )
    }
}

impl Default for Twitter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct MirrorResponse {
    tweet: Option<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    media: Option<TweetMedia>,
}

#[derive(Debug, Deserialize)]
struct TweetMedia {
    all: Option<Vec<MediaItem>>,
    photos: Option<Vec<MediaItem>>,
    videos: Option<Vec<MediaItem>>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    #[serde(rename = "type", default)]
    kind: String,
    url: Option<String>,
}

#[async_trait]
impl Resolver for Twitter {
    fn name(&self) -> &'static str {
        "twitter"
    }

    fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn is_link(&self, url: &str) -> bool {
        self.is_primary(url) || self.is_short_link(url)
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
                "Invalid link source. Only twitter.com/x.com links are allowed.".to_string(),
            ));
        }

        let post = if self.is_short_link(url) {
            let expanded = fetcher.expand(url, self.profile.headers).await?;
            debug!(from = %url, to = %expanded, "expanded short link");
            if !self.is_primary(expanded.as_str()) {
                return Err(ResolveError::UnsupportedDomain(
                    "Short link did not resolve to a Twitter/X URL".to_string(),
                ));
            }
            expanded
        } else {
            Url::parse(url).map_err(|e| {
                ResolveError::UnrecognizedUrlFormat(format!("Invalid Twitter link: {}", e))
            })?
        };

        let resp = fetcher.get(&self.api_url(&post), self.profile.headers).await?;
        if !resp.is_ok() {
            return Err(ResolveError::FetchFailure(format!(
                "fxtwitter API returned HTTP {}",
                resp.status
            )));
        }

        let payload: MirrorResponse = resp.json()?;
        media_from_mirror(payload)
    }
}

fn media_from_mirror(payload: MirrorResponse) -> Result<Vec<ResolvedMedia>, ResolveError> {
    let tweet = payload
        .tweet
        .ok_or_else(|| ResolveError::NoMediaFound("No tweet data found".to_string()))?;
    let media = tweet
        .media
        .ok_or_else(|| ResolveError::NoMediaFound("No media found in tweet".to_string()))?;

    let all = [media.all, media.photos, media.videos]
        .into_iter()
        .flatten()
        .find(|list| !list.is_empty())
        .ok_or_else(|| ResolveError::NoMediaFound("No media items found in tweet".to_string()))?;

    let items: Vec<ResolvedMedia> = all
        .into_iter()
        .filter_map(|item| {
            let url = item.url.filter(|u| !u.is_empty())?;
            match item.kind.as_str() {
                "video" | "gif" => Some(ResolvedMedia::video(url)),
                "photo" => Some(ResolvedMedia::image(url)),
                _ => None,
            }
        })
        .collect();

    if items.is_empty() {
        return Err(ResolveError::NoMediaFound(
            "Could not extract media URLs from tweet".to_string(),
        ));
    }

    Ok(items)
}
