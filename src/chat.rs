//! Chat-platform boundary: the channel abstraction and per-message handling

use crate::delivery::deliver;
use crate::dispatch::Dispatcher;
use crate::fetch::Fetcher;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// The two things core needs from a chat channel.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Post plain text
    async fn notify_failure(&self, text: &str) -> Result<()>;

    /// Upload a named file
    async fn send_file(&self, filename: &str, data: Vec<u8>) -> Result<()>;
}

/// Inbound message as the platform adapter hands it over
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub author_is_self: bool,
    pub text: String,
}

/// How a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Own message or no supported link
    Ignored,
    /// Resolution failed and the error was posted
    Failed,
    /// Every resolved item went through delivery
    Delivered,
}

/// Resolve the first supported link in `message` and deliver its media.
///
/// Every failure ends up as a text post in `channel`. The only error
/// returned is the channel refusing a resolve-failure post; a refused
/// post about one item never stops the remaining items.
pub async fn handle_message(
    dispatcher: &Dispatcher,
    channel: &dyn ChatChannel,
    message: &IncomingMessage,
    timeout: Duration,
) -> Result<Handled> {
    if message.author_is_self {
        return Ok(Handled::Ignored);
    }

    let Some((resolver, url)) = dispatcher.match_text(&message.text) else {
        return Ok(Handled::Ignored);
    };
    info!(site = resolver.name(), url = %url, "handling link");

    let fetcher = match Fetcher::new(timeout) {
        Ok(f) => f,
        Err(e) => {
            channel
                .notify_failure(&format!("Error processing the link: {}", e))
                .await?;
            return Ok(Handled::Failed);
        }
    };

    let media = match resolver.resolve(&fetcher, &url).await {
        Ok(media) => media,
        Err(e) => {
            warn!(
                site = resolver.name(),
                url = %url,
                kind = e.kind(),
                error = %e,
                "resolve failed"
            );
            channel
                .notify_failure(&format!("Error processing the link: {}", e))
                .await?;
            return Ok(Handled::Failed);
        }
    };

    if media.is_empty() {
        channel
            .notify_failure("Could not find media in the link.")
            .await?;
        return Ok(Handled::Failed);
    }

    for item in &media {
        if let Err(e) = deliver(&fetcher, channel, item, resolver.profile().headers).await {
            warn!(url = %item.url, error = %e, "delivery failed");
            let report = format!("Failed to deliver media: {}", e);
            if let Err(e) = channel.notify_failure(&report).await {
                // keep going; later items may still upload
                warn!(url = %item.url, error = %e, "could not report delivery failure");
            }
        }
    }

    Ok(Handled::Delivered)
}
