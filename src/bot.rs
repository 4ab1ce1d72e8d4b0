//! Long-running bot loop
//!
//! Polls every text channel the bot can see and spawns one independent task
//! per new message. Tasks share nothing but the read-only dispatcher and the
//! REST client; Ctrl-C aborts whatever is still in flight.

use crate::chat::{handle_message, IncomingMessage};
use crate::discord::{DiscordChannel, DiscordClient, DiscordMessage};
use crate::dispatch::Dispatcher;
use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Messages fetched per channel per poll
const POLL_LIMIT: u8 = 20;

/// Configuration for the bot loop
pub struct BotConfig {
    pub token: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Newest message id seen per channel.
///
/// A channel seen for the first time only records its high-water mark, so
/// history is never replayed on startup.
#[derive(Debug, Default)]
pub struct SeenMessages {
    last: HashMap<String, u64>,
}

impl SeenMessages {
    /// Messages newer than the last poll, oldest first
    pub fn take_new(
        &mut self,
        channel_id: &str,
        mut messages: Vec<DiscordMessage>,
    ) -> Vec<DiscordMessage> {
        messages.retain(|m| m.id.parse::<u64>().is_ok());
        messages.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(0));

        let newest = messages.last().and_then(|m| m.id.parse::<u64>().ok());
        let previous = self.last.get(channel_id).copied();

        if let Some(newest) = newest {
            let mark = previous.map_or(newest, |p| p.max(newest));
            self.last.insert(channel_id.to_string(), mark);
        }

        match previous {
            Some(prev) => messages
                .into_iter()
                .filter(|m| m.id.parse::<u64>().is_ok_and(|id| id > prev))
                .collect(),
            None => {
                // first sighting; an empty channel still gets a mark
                self.last.entry(channel_id.to_string()).or_insert(0);
                Vec::new()
            }
        }
    }
}

/// Run until Ctrl-C
pub async fn run_bot(config: BotConfig) -> Result<()> {
    let client = Arc::new(DiscordClient::new(config.token.clone(), config.timeout)?);
    let bot_id = client.current_user_id().await?;
    info!(bot_id = %bot_id, "online");

    let dispatcher = Arc::new(Dispatcher::new());
    let mut seen = SeenMessages::default();
    let mut tasks = JoinSet::new();
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                // a sweep can take a while; Ctrl-C must not wait for it
                let sweep = poll_once(&client, &mut seen);
                let Some(fresh) = unless_shutdown(shutdown.as_mut(), sweep).await else {
                    break;
                };
                for message in fresh {
                    let incoming = IncomingMessage {
                        author_is_self: message.author.id == bot_id,
                        text: message.content,
                    };
                    let channel = DiscordChannel::new(Arc::clone(&client), message.channel_id);
                    let dispatcher = Arc::clone(&dispatcher);
                    let timeout = config.timeout;
                    tasks.spawn(async move {
                        let handled =
                            handle_message(&dispatcher, &channel, &incoming, timeout).await;
                        if let Err(e) = handled {
                            warn!(error = %e, "could not report to channel");
                        }
                    });
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!(error = %e, "message task panicked");
                    }
                }
            }
        }
    }

    info!(in_flight = tasks.len(), "shutting down");
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    Ok(())
}

/// Drive `work` to completion unless `shutdown` resolves first
async fn unless_shutdown<S, W>(shutdown: Pin<&mut S>, work: W) -> Option<W::Output>
where
    S: Future,
    W: Future,
{
    tokio::select! {
        biased;
        _ = shutdown => None,
        out = work => Some(out),
    }
}

/// One sweep over every visible text channel
async fn poll_once(client: &DiscordClient, seen: &mut SeenMessages) -> Vec<DiscordMessage> {
    let guilds = match client.guild_ids().await {
        Ok(g) => g,
        Err(e) => {
            warn!(error = %e, "failed to list guilds");
            return Vec::new();
        }
    };

    let mut fresh = Vec::new();
    for guild_id in &guilds {
        let channels = match client.text_channel_ids(guild_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "failed to list channels");
                continue;
            }
        };

        for channel_id in &channels {
            match client.recent_messages(channel_id, POLL_LIMIT).await {
                Ok(messages) => fresh.extend(seen.take_new(channel_id, messages)),
                // missing read permission is common; not worth a warning
                Err(e) => debug!(channel = %channel_id, error = %e, "skipping channel"),
            }
        }
    }

    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::DiscordUser;

    fn msg(id: u64) -> DiscordMessage {
        DiscordMessage {
            id: id.to_string(),
            channel_id: "c".to_string(),
            author: DiscordUser {
                id: "u".to_string(),
                bot: false,
            },
            content: format!("m{}", id),
        }
    }

    #[test]
    fn test_first_poll_primes_only() {
        let mut seen = SeenMessages::default();
        assert!(seen.take_new("c", vec![msg(3), msg(2), msg(1)]).is_empty());
    }

    #[test]
    fn test_new_messages_oldest_first() {
        let mut seen = SeenMessages::default();
        seen.take_new("c", vec![msg(2), msg(1)]);
        let fresh = seen.take_new("c", vec![msg(5), msg(4), msg(3), msg(2)]);
        let ids: Vec<_> = fresh.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["3", "4", "5"]);
        assert!(seen.take_new("c", vec![msg(5), msg(4)]).is_empty());
    }

    #[test]
    fn test_empty_channel_then_message() {
        let mut seen = SeenMessages::default();
        assert!(seen.take_new("c", Vec::new()).is_empty());
        let fresh = seen.take_new("c", vec![msg(9)]);
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_pending_work() {
        let shutdown = std::future::ready(());
        tokio::pin!(shutdown);
        let out = unless_shutdown(shutdown.as_mut(), std::future::pending::<u32>()).await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_work_finishes_without_shutdown() {
        let shutdown = std::future::pending::<()>();
        tokio::pin!(shutdown);
        let out = unless_shutdown(shutdown.as_mut(), async { 7u32 }).await;
        assert_eq!(out, Some(7));
    }

    #[test]
    fn test_channels_tracked_separately() {
        let mut seen = SeenMessages::default();
        seen.take_new("a", vec![msg(10)]);
        assert!(seen.take_new("b", vec![msg(11)]).is_empty());
        assert_eq!(seen.take_new("a", vec![msg(11)]).len(), 1);
    }
}
