//! Download a resolved asset and hand it to the chat channel
//!
//! Uploads are capped at 8 MiB. When the server declares a larger
//! Content-Length the body is never read; otherwise the body is read chunk
//! by chunk and abandoned as soon as it crosses the cap.

use crate::chat::ChatChannel;
use crate::error::DeliveryError;
use crate::fetch::Fetcher;
use crate::heic::{fix_heic_media, has_heic_filename, is_real_heic};
use crate::media::{slop_link, ResolvedMedia};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, info, warn};

/// Largest file the chat platform accepts from bots
pub const MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;

/// What ended up in the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    /// Uploaded as a file with this name
    File(String),
    /// Too large; the link was posted instead
    Link,
    /// Asset answered with a non-200 status
    DownloadFailed(u16),
}

/// Fetch `item` with the owning site's headers and post it to `channel`.
pub async fn deliver(
    fetcher: &Fetcher,
    channel: &dyn ChatChannel,
    item: &ResolvedMedia,
    headers: &[(&str, &str)],
) -> Result<Delivered, DeliveryError> {
    let mut request = fetcher.client().get(&item.url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let mut response = request.send().await?;

    let status = response.status().as_u16();
    if status != 200 {
        warn!(url = %item.url, status, "media download failed");
        notify(channel, "Failed to download media.").await?;
        return Ok(Delivered::DownloadFailed(status));
    }

    let declared = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_UPLOAD_BYTES) {
        info!(url = %item.url, len = declared, "asset over upload cap, posting link");
        notify(channel, &slop_link(&item.url)).await?;
        return Ok(Delivered::Link);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut data = Vec::with_capacity(declared.unwrap_or(0) as usize);
    while let Some(chunk) = response.chunk().await? {
        data.extend_from_slice(&chunk);
        if data.len() as u64 > MAX_UPLOAD_BYTES {
            info!(url = %item.url, "asset body over upload cap, posting link");
            notify(channel, &slop_link(&item.url)).await?;
            return Ok(Delivered::Link);
        }
    }

    let mut filename = item.filename();
    if item.is_video != Some(true)
        && (is_real_heic(&data, &content_type) || has_heic_filename(&filename))
    {
        debug!(filename = %filename, "fixing heic media");
        let name = filename.clone();
        let (fixed, fixed_name) = tokio::task::spawn_blocking(move || fix_heic_media(data, &name))
            .await
            .map_err(|e| DeliveryError::Transcode(e.to_string()))??;
        data = fixed;
        filename = fixed_name;
    }

    debug!(filename = %filename, len = data.len(), "uploading");
    channel
        .send_file(&filename, data)
        .await
        .map_err(DeliveryError::Upload)?;
    Ok(Delivered::File(filename))
}

async fn notify(channel: &dyn ChatChannel, text: &str) -> Result<(), DeliveryError> {
    channel.notify_failure(text).await.map_err(DeliveryError::Upload)
}
