//! Discord REST adapter: text posts, file uploads, and message polling.

use crate::chat::ChatChannel;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Discord API base URL
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// GUILD_TEXT channel type
const GUILD_TEXT: u64 = 0;

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    #[serde(rename = "type")]
    kind: u64,
}

/// Bot-token REST client
pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl DiscordClient {
    pub fn new(token: String, timeout: Duration) -> Result<Self> {
        Self::with_api_base(token, timeout, DISCORD_API_BASE)
    }

    pub fn with_api_base(token: String, timeout: Duration, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("DiscordBot (slopbot, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .context("Failed to build Discord HTTP client")?;
        Ok(Self {
            http,
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.auth())
            .send()
            .await
            .with_context(|| format!("Discord request failed: {}", path))?;

        if !resp.status().is_success() {
            bail!("Discord GET {} failed: {}", path, resp.status());
        }
        resp.json()
            .await
            .with_context(|| format!("Unexpected Discord response for {}", path))
    }

    /// Id of the bot account; also validates the token
    pub async fn current_user_id(&self) -> Result<String> {
        let me: IdOnly = self
            .get_json("/users/@me")
            .await
            .context("Discord auth failed")?;
        Ok(me.id)
    }

    pub async fn guild_ids(&self) -> Result<Vec<String>> {
        let guilds: Vec<IdOnly> = self.get_json("/users/@me/guilds").await?;
        Ok(guilds.into_iter().map(|g| g.id).collect())
    }

    pub async fn text_channel_ids(&self, guild_id: &str) -> Result<Vec<String>> {
        let channels: Vec<ChannelInfo> = self
            .get_json(&format!("/guilds/{}/channels", guild_id))
            .await?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT)
            .map(|c| c.id)
            .collect())
    }

    /// Most recent messages, newest first
    pub async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<DiscordMessage>> {
        self.get_json(&format!("/channels/{}/messages?limit={}", channel_id, limit))
            .await
    }

    pub async fn send_text(&self, channel_id: &str, content: &str) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.auth())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .context("Discord send failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Discord send failed: {} - {}", status, body);
        }
        Ok(())
    }

    pub async fn send_file(&self, channel_id: &str, filename: &str, data: Vec<u8>) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let payload = serde_json::json!({
            "attachments": [{ "id": 0, "filename": filename }]
        });
        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", Part::bytes(data).file_name(filename.to_string()));

        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.auth())
            .multipart(form)
            .send()
            .await
            .context("Discord upload failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Discord upload failed: {} - {}", status, body);
        }
        Ok(())
    }
}

/// One Discord channel seen through the [`ChatChannel`] boundary
pub struct DiscordChannel {
    client: Arc<DiscordClient>,
    channel_id: String,
}

impl DiscordChannel {
    pub fn new(client: Arc<DiscordClient>, channel_id: String) -> Self {
        Self { client, channel_id }
    }
}

#[async_trait]
impl ChatChannel for DiscordChannel {
    async fn notify_failure(&self, text: &str) -> Result<()> {
        self.client.send_text(&self.channel_id, text).await
    }

    async fn send_file(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        self.client.send_file(&self.channel_id, filename, data).await
    }
}
