//! Instagram posts, reels and carousels
//!
//! Two tiers. The public page usually carries OpenGraph tags for the cover
//! item, which is enough for single posts. Carousels (or pages that expose no
//! tags) go through the internal GraphQL endpoint the web client uses.

use super::{host_ends_with, Resolver, SiteProfile, CHROME_UA};
use crate::error::ResolveError;
use crate::extract::{collect_meta, find_link};
use crate::fetch::Fetcher;
use crate::media::ResolvedMedia;
use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

const GRAPHQL_DOC_ID: &str = "8845758582119845";
const GRAPHQL_APP_ID: &str = "936619743392459";
const ASBD_ID: &str = "129477";
const SIDECAR_TYPENAME: &str = "XDTGraphSidecar";

const HEADERS: &[(&str, &str)] = &[
    ("User-Agent", CHROME_UA),
    ("Accept-Language", "en-US,en;q=0.9"),
];

/// Places the web bundle has been seen to embed the LSD token, newest first.
/// Upstream moves this around; add a pattern here when it does.
static LSD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""LSD",\[\],\{"token":"([^"]+)"#,
        r#""LSD":\{"token":"([^"]+)"#,
        r#""lsd",\[\],\{"token":"([^"]+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("lsd pattern"))
    .collect()
});

pub struct Instagram {
    profile: SiteProfile,
}

impl Instagram {
    pub fn new() -> Self {
        Self::with_profile(Self::default_profile())
    }

    pub fn with_profile(profile: SiteProfile) -> Self {
        Self { profile }
    }

    pub fn default_profile() -> SiteProfile {
        SiteProfile::new(HEADERS, &["instagram.com", "instagr.am"])
            .origin("https://www.instagram.com/")
            .api_endpoint("https://www.instagram.com/graphql/query/")
    }

    async fn resolve_via_graphql(
        &self,
        fetcher: &Fetcher,
        link: &Url,
        page_token: Option<String>,
    ) -> Result<Vec<ResolvedMedia>, ResolveError> {
        let post = PostRef::from_url(link)?;

        let variables = serde_json::json!({
            "shortcode": post.shortcode,
            "fetch_comment_count": 0,
            "parent_comment_count": 0,
            "child_comment_count": 0,
            "has_threaded_comments": false,
            "hoisted_comment_id": "",
            "hoisted_reply_id": "",
        })
        .to_string();

        let endpoint = Url::parse_with_params(
            &self.profile.api_endpoint,
            &[("doc_id", GRAPHQL_DOC_ID), ("variables", variables.as_str())],
        )
        .map_err(|e| {
            ResolveError::MalformedUpstreamResponse(format!("Bad GraphQL endpoint: {}", e))
        })?;

        let origin = Url::parse(&self.profile.origin)
            .map_err(|e| {
                ResolveError::MalformedUpstreamResponse(format!("Bad site origin: {}", e))
            })?;
        let referer = origin
            .join(&post.canonical_path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.profile.origin.clone());

        // cookie-issued LSD beats the one scraped from the bundle
        let csrf = fetcher.cookie(&origin, "csrftoken");
        let lsd = fetcher.cookie(&origin, "lsd").or(page_token);

        let mut headers: Vec<(&str, &str)> = self.profile.headers.to_vec();
        headers.extend([
            ("Accept", "*/*"),
            ("X-IG-App-ID", GRAPHQL_APP_ID),
            ("Referer", referer.as_str()),
            ("X-ASBD-ID", ASBD_ID),
            ("X-Requested-With", "XMLHttpRequest"),
        ]);
        if let Some(csrf) = csrf.as_deref() {
            headers.push(("X-CSRFToken", csrf));
        }
        if let Some(lsd) = lsd.as_deref() {
            headers.push(("X-FB-LSD", lsd));
        }

        debug!(
            shortcode = %post.shortcode,
            has_csrf = csrf.is_some(),
            has_lsd = lsd.is_some(),
            "querying graphql"
        );
        let resp = fetcher.get(endpoint.as_str(), &headers).await?;
        if !resp.is_ok() {
            return Err(ResolveError::FetchFailure(format!(
                "Instagram GraphQL returned HTTP {}",
                resp.status
            )));
        }

        let payload: GraphqlPayload = resp.json()?;
        let media = payload
            .data
            .and_then(|d| d.xdt_shortcode_media)
            .ok_or_else(|| {
                ResolveError::MalformedUpstreamResponse(
                    "GraphQL response did not include media information".to_string(),
                )
            })?;

        media_from_shortcode_node(&media, post.image_index)
    }
}

impl Default for Instagram {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for Instagram {
    fn name(&self) -> &'static str {
        "instagram"
    }

    fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn is_link(&self, url: &str) -> bool {
        host_ends_with(url, &self.profile.domains)
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
                "Invalid link source. Only instagram.com links are allowed.".to_string(),
            ));
        }
        let link = Url::parse(url).map_err(|e| {
            ResolveError::UnrecognizedUrlFormat(format!("Invalid Instagram link: {}", e))
        })?;

        let page = fetcher.get(url, self.profile.headers).await?;
        if !page.is_ok() {
            return Err(ResolveError::FetchFailure(format!(
                "Failed to fetch Instagram page: {}",
                page.status
            )));
        }
        let html = page.text();

        let from_meta = media_from_meta(&html);
        if !from_meta.is_empty() && image_index_param(&link).is_none() {
            debug!(url = %url, "resolved from page meta");
            return Ok(from_meta);
        }

        let token = scrape_lsd_token(&html);
        self.resolve_via_graphql(fetcher, &link, token).await
    }
}

/// Shortcode and selection info carried by a post URL
#[derive(Debug, PartialEq, Eq)]
struct PostRef {
    shortcode: String,
    /// `<type>/<shortcode>/`
    canonical_path: String,
    /// 1-based carousel index from `img_index`
    image_index: Option<i64>,
}

impl PostRef {
    fn from_url(url: &Url) -> Result<Self, ResolveError> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() < 2 {
            return Err(ResolveError::UnrecognizedUrlFormat(
                "Unrecognized Instagram URL format; expected /<type>/<shortcode>/".to_string(),
            ));
        }

        Ok(Self {
            shortcode: segments[1].to_string(),
            canonical_path: format!("{}/{}/", segments[0], segments[1]),
            image_index: image_index_param(url).map(|raw| raw.trim().parse().unwrap_or(1)),
        })
    }
}

/// Raw `img_index` (or `img_index[]`) query value, ignoring blanks
fn image_index_param(url: &Url) -> Option<String> {
    let lookup = |key: &str| {
        url.query_pairs()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    };
    lookup("img_index").or_else(|| lookup("img_index[]"))
}

/// First LSD anti-forgery token found in the page source
pub fn scrape_lsd_token(html: &str) -> Option<String> {
    LSD_PATTERNS
        .iter()
        .find_map(|re| re.captures(html).map(|c| c[1].to_string()))
}

/// Cover item from OpenGraph tags: video tags first, then the image
fn media_from_meta(html: &str) -> Vec<ResolvedMedia> {
    let doc = Html::parse_document(html);
    let meta = collect_meta(&doc);

    for key in ["og:video:secure_url", "og:video:url", "og:video"] {
        if let Some(video) = meta.get(key) {
            return vec![ResolvedMedia::video(video.clone())];
        }
    }

    match meta.get("og:image") {
        Some(image) => vec![ResolvedMedia::image(image.clone())],
        None => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlPayload {
    data: Option<GraphqlData>,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    xdt_shortcode_media: Option<MediaNode>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaNode {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    is_video: Option<bool>,
    video_url: Option<String>,
    display_url: Option<String>,
    video_resources: Option<Vec<VideoResource>>,
    edge_sidecar_to_children: Option<Edges>,
}

#[derive(Debug, Deserialize)]
struct Edges {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Option<MediaNode>,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    src: Option<String>,
    width: Option<f64>,
}

impl MediaNode {
    fn is_video(&self) -> bool {
        self.is_video.unwrap_or(false)
    }

    fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref().filter(|u| !u.is_empty())
    }

    fn display_url(&self) -> Option<&str> {
        self.display_url.as_deref().filter(|u| !u.is_empty())
    }

    /// Widest entry of the video resource list
    fn best_video_resource(&self) -> Option<&str> {
        self.video_resources
            .as_ref()?
            .iter()
            .max_by(|a, b| {
                let (wa, wb) = (a.width.unwrap_or(0.0), b.width.unwrap_or(0.0));
                wa.total_cmp(&wb)
            })?
            .src
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    /// Single item for a carousel child
    fn child_media(&self) -> Option<ResolvedMedia> {
        if self.is_video() {
            if let Some(url) = self.video_url().or_else(|| self.best_video_resource()) {
                return Some(ResolvedMedia::video(url));
            }
        }
        self.display_url().map(ResolvedMedia::image)
    }
}

fn media_from_shortcode_node(
    media: &MediaNode,
    image_index: Option<i64>,
) -> Result<Vec<ResolvedMedia>, ResolveError> {
    if media.is_video() {
        if let Some(url) = media.video_url() {
            return Ok(vec![ResolvedMedia::video(url)]);
        }
    }

    if media.typename.as_deref() == Some(SIDECAR_TYPENAME) {
        let items: Vec<ResolvedMedia> = media
            .edge_sidecar_to_children
            .iter()
            .flat_map(|e| e.edges.iter())
            .filter_map(|edge| edge.node.as_ref())
            .filter_map(MediaNode::child_media)
            .collect();

        if !items.is_empty() {
            return Ok(match image_index {
                Some(index) => {
                    let last = items.len() as i64 - 1;
                    let idx = index.saturating_sub(1).clamp(0, last) as usize;
                    vec![items[idx].clone()]
                }
                None => items,
            });
        }
    }

    match media.display_url() {
        Some(url) => Ok(vec![ResolvedMedia::image(url)]),
        None => Err(ResolveError::NoMediaFound(
            "GraphQL response missing media URLs".to_string(),
        )),
    }
}
