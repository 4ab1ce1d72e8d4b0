//! Resolved media items and the per-page candidate accumulator

use std::collections::HashSet;
use url::Url;

/// One downloadable asset produced by a resolver.
///
/// `is_video` is `None` when the resolver could not classify the asset; it
/// only matters for the filename extension fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub is_video: Option<bool>,
}

impl ResolvedMedia {
    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_video: Some(true),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_video: Some(false),
        }
    }

    pub fn unclassified(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_video: None,
        }
    }

    /// Upload filename derived from the URL's last path segment
    pub fn filename(&self) -> String {
        filename_from_url(&self.url, self.is_video)
    }
}

/// Ordered, de-duplicated URLs scraped from a single page.
///
/// Lives only for one resolution call. First occurrence wins.
#[derive(Debug, Default)]
pub struct CandidateSet {
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `raw` against `base` and append it unless already present.
    ///
    /// Protocol-relative URLs get `https:`, root-relative paths are joined
    /// onto the page URL, anything that is still not http(s) is dropped.
    pub fn add(&mut self, raw: &str, base: &Url) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }

        let url = if raw.starts_with("//") {
            format!("https:{}", raw)
        } else if raw.starts_with('/') {
            match base.join(raw) {
                Ok(joined) => joined.to_string(),
                Err(_) => return,
            }
        } else {
            raw.to_string()
        };

        if !url.to_ascii_lowercase().starts_with("http") {
            return;
        }

        if self.seen.insert(url.clone()) {
            self.urls.push(url);
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }
}

/// Filename for an upload: last path segment, with `.mp4`/`.jpg` appended
/// when it has no extension and the media kind is known.
pub fn filename_from_url(url: &str, is_video: Option<bool>) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());

    let name = path.rsplit('/').next().unwrap_or_default();
    let mut name = if name.is_empty() {
        "media".to_string()
    } else {
        name.to_string()
    };

    if !has_extension(&name) {
        match is_video {
            Some(true) => name.push_str(".mp4"),
            Some(false) => name.push_str(".jpg"),
            None => {}
        }
    }

    name
}

fn has_extension(name: &str) -> bool {
    match name.rfind('.') {
        // a leading dot is a hidden file, not an extension
        Some(idx) => idx > 0 && idx + 1 < name.len(),
        None => false,
    }
}

/// Replace the extension of `name`, keeping the stem
pub fn with_extension(name: &str, ext: &str) -> String {
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    format!("{}.{}", stem, ext)
}

/// Markdown label used whenever a link is posted instead of a file
pub fn slop_link(url: &str) -> String {
    format!("[slop](<{}>)", url)
}
