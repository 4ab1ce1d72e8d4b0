//! One-shot resolution for `--url`

use crate::dispatch::Dispatcher;
use crate::fetch::Fetcher;
use crate::media::slop_link;
use anyhow::Result;
use std::io::Write;

/// Resolve `url` once and write one `[slop](<url>)` line per item to `out`.
///
/// Returns the number of items written.
pub async fn run_oneshot(
    dispatcher: &Dispatcher,
    fetcher: &Fetcher,
    url: &str,
    out: &mut impl Write,
) -> Result<usize> {
    let media = dispatcher.resolve_url(fetcher, url.trim()).await?;
    for item in &media {
        writeln!(out, "{}", slop_link(&item.url))?;
    }
    out.flush()?;
    Ok(media.len())
}
