//! Ordered resolver registry

use crate::error::ResolveError;
use crate::fetch::Fetcher;
use crate::media::ResolvedMedia;
use crate::resolvers::{IFunny, Instagram, Resolver, TikTok, Twitter};
use tracing::{debug, info};

/// Holds resolvers in priority order; the first match wins.
pub struct Dispatcher {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl Dispatcher {
    /// iFunny, Instagram, TikTok, Twitter
    pub fn new() -> Self {
        Self::with_resolvers(vec![
            Box::new(IFunny::new()),
            Box::new(Instagram::new()),
            Box::new(TikTok::new()),
            Box::new(Twitter::new()),
        ])
    }

    pub fn with_resolvers(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    /// First resolver whose text matcher finds a link, with that link
    pub fn match_text(&self, text: &str) -> Option<(&dyn Resolver, String)> {
        self.resolvers
            .iter()
            .find_map(|r| r.match_text(text).map(|url| (r.as_ref(), url)))
    }

    /// Resolver owning the URL's domain, ignoring message-text conventions
    pub fn is_supported(&self, url: &str) -> Option<&dyn Resolver> {
        self.resolvers
            .iter()
            .find(|r| r.is_link(url))
            .map(|r| r.as_ref())
    }

    /// Resolve a bare URL once, as the CLI does
    pub async fn resolve_url(
        &self,
        fetcher: &Fetcher,
        url: &str,
    ) -> Result<Vec<ResolvedMedia>, ResolveError> {
        let resolver = self
            .is_supported(url)
            .ok_or_else(ResolveError::unsupported_domain)?;
        info!(site = resolver.name(), url = %url, "resolving");
        let media = resolver.resolve(fetcher, url).await?;
        debug!(site = resolver.name(), count = media.len(), "resolved");
        Ok(media)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
