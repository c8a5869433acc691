//! HTTP implementation of [`AudioEngine`] for a Lavalink/Andesite-style node.
//!
//! Every player mutation is a `PATCH /players/{guild}` with only the fields
//! that change. Voice binding and teardown have their own routes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};

use super::retry::with_retry;
use super::{AudioEngine, EngineError, EngineResult, PlayedTrack};
use crate::entry::Eid;
use crate::state::EngineConfig;
use crate::types::{ChannelId, GuildId};

/// Subset of the player object returned by the node after a play command.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    #[serde(default)]
    track: Option<TrackResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackResponse {
    info: TrackInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackInfo {
    /// Length in milliseconds.
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    is_stream: bool,
}

impl PlayerResponse {
    fn into_played(self) -> PlayedTrack {
        let duration = self
            .track
            .filter(|t| !t.info.is_stream)
            .and_then(|t| t.info.length)
            .map(Duration::from_millis);
        PlayedTrack { duration }
    }
}

/// REST client for the audio engine node.
pub struct HttpEngineClient {
    client: Client,
    base_url: String,
    password: Option<String>,
}

impl HttpEngineClient {
    /// Builds a client from engine configuration.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            password: config.password.clone(),
        })
    }

    /// Sends one request and returns the response body.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> EngineResult<String> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("[Engine] {} {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(ref password) = self.password {
            request = request.header("Authorization", password);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let start = Instant::now();
        let res = request.send().await;
        log::debug!(
            "[Engine] {} {} completed in {:?}: {:?}",
            method,
            path,
            start.elapsed(),
            res.as_ref().map(|r| r.status())
        );

        let res = res?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(EngineError::HttpStatus(status.as_u16(), text));
        }
        Ok(text)
    }

    async fn update_player(&self, action: &str, guild: GuildId, body: Value) -> EngineResult<String> {
        let path = format!("/players/{}", guild);
        with_retry(action, || self.send(Method::PATCH, &path, Some(&body))).await
    }
}

#[async_trait]
impl AudioEngine for HttpEngineClient {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> EngineResult<()> {
        let path = format!("/players/{}/voice", guild);
        let body = json!({ "channelId": channel.to_string() });
        with_retry("join", || self.send(Method::PUT, &path, Some(&body))).await?;
        Ok(())
    }

    async fn leave(&self, guild: GuildId) -> EngineResult<()> {
        let path = format!("/players/{}", guild);
        with_retry("leave", || self.send(Method::DELETE, &path, None)).await?;
        Ok(())
    }

    async fn play(&self, guild: GuildId, eid: &Eid, start: Duration) -> EngineResult<PlayedTrack> {
        let body = json!({
            "track": { "identifier": eid.as_str() },
            "position": start.as_millis() as u64,
            "paused": false,
        });
        let text = self.update_player("play", guild, body).await?;
        if text.trim().is_empty() {
            return Ok(PlayedTrack::default());
        }
        let player: PlayerResponse =
            serde_json::from_str(&text).map_err(|e| EngineError::Decode(e.to_string()))?;
        Ok(player.into_played())
    }

    async fn pause(&self, guild: GuildId, paused: bool) -> EngineResult<()> {
        self.update_player("pause", guild, json!({ "paused": paused }))
            .await?;
        Ok(())
    }

    async fn set_volume(&self, guild: GuildId, volume: f32) -> EngineResult<()> {
        let volume = volume.round() as u32;
        self.update_player("volume", guild, json!({ "volume": volume }))
            .await?;
        Ok(())
    }

    async fn seek(&self, guild: GuildId, position: Duration) -> EngineResult<()> {
        let position = position.as_millis() as u64;
        self.update_player("seek", guild, json!({ "position": position }))
            .await?;
        Ok(())
    }

    async fn stop(&self, guild: GuildId) -> EngineResult<()> {
        self.update_player("stop", guild, json!({ "track": { "encoded": null } }))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> EngineResult<()> {
        self.send(Method::GET, "/stats", None).await?;
        Ok(())
    }
}
