//! URL and markup extraction helpers
//!
//! Everything here is pure: text or HTML in, strings out.

use crate::media::CandidateSet;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("url regex"));

/// Attributes on `<source>`, `<video>` and `<img>` that may hold media URLs
const MEDIA_ATTRS: [&str; 5] = ["src", "data-src", "data-gif", "data-original", "data-url"];

/// URL-looking tokens in message text, in order of appearance.
///
/// Chat clients wrap links as `<url>` to suppress embeds, and prose tends to
/// glue `).,` onto the end, so both are stripped.
pub fn extract_urls(content: &str) -> Vec<String> {
    URL_RE
        .find_iter(content)
        .map(|m| {
            m.as_str()
                .trim_matches(|c| c == '<' || c == '>')
                .trim_end_matches([')', '.', ','])
                .to_string()
        })
        .filter(|url| !url.is_empty())
        .collect()
}

/// First URL token in `content` accepted by `is_link`
pub fn find_link(content: &str, is_link: impl Fn(&str) -> bool) -> Option<String> {
    extract_urls(content).into_iter().find(|url| is_link(url))
}

/// All `<meta>` tags keyed by lower-cased `property` (or `name`).
///
/// Later tags overwrite earlier ones with the same key.
pub fn collect_meta(doc: &Html) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    let Ok(selector) = Selector::parse("meta") else {
        return meta;
    };

    for el in doc.select(&selector) {
        let attrs = el.value();
        let key = attrs
            .attr("property")
            .filter(|k| !k.is_empty())
            .or_else(|| attrs.attr("name"));
        let (Some(key), Some(value)) = (key, attrs.attr("content")) else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        meta.insert(key.to_ascii_lowercase(), value.to_string());
    }

    meta
}

/// `content` of the first `<meta property=...>` with that property
pub fn meta_property(doc: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse("meta[property]").ok()?;
    doc.select(&selector)
        .find(|el| el.value().attr("property") == Some(property))
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.to_string())
}

/// Candidate media URLs on a meme page, in priority-neutral page order:
/// `og:video:secure_url`, `og:image`, then every media attribute on
/// `<source>`/`<video>`/`<img>` tags.
pub fn extract_media_candidates(html: &str, base: &Url) -> CandidateSet {
    let doc = Html::parse_document(html);
    let mut candidates = CandidateSet::new();

    if let Some(video) = meta_property(&doc, "og:video:secure_url") {
        candidates.add(&video, base);
    }
    if let Some(image) = meta_property(&doc, "og:image") {
        candidates.add(&image, base);
    }

    if let Ok(selector) = Selector::parse("source, video, img") {
        for el in doc.select(&selector) {
            for attr in MEDIA_ATTRS {
                if let Some(value) = el.value().attr(attr) {
                    candidates.add(value, base);
                }
            }
        }
    }

    candidates
}
