//! Headless transport: logs outbound actions instead of talking to a chat
//! platform.
//!
//! Lets the daemon run without gateway credentials. Voice connections are
//! tracked in memory so the executor's guard semantics behave exactly as
//! they would against a live platform, and playback fails when the audio
//! asset does not exist, which keeps misconfigured guilds visible in the
//! logs.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chime_core::errors::TransportError;
use chime_core::transport::ChatTransport;
use chime_core::types::{ChannelId, GuildId};
use tracing::info;

#[derive(Debug, Default)]
pub struct LogTransport {
    connected: Mutex<HashSet<GuildId>>,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatTransport for LogTransport {
    async fn connect_voice(
        &self,
        guild: &GuildId,
        channel: &ChannelId,
    ) -> Result<(), TransportError> {
        info!("guild {guild}: connected to voice channel #{channel}");
        self.connected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(guild.clone());
        Ok(())
    }

    async fn disconnect_voice(&self, guild: &GuildId) {
        info!("guild {guild}: disconnected from voice");
        self.connected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(guild);
    }

    async fn is_voice_connected(&self, guild: &GuildId) -> bool {
        self.connected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(guild)
    }

    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<(), TransportError> {
        info!("#{channel} <- {text}");
        Ok(())
    }

    async fn play_audio(&self, guild: &GuildId, path: &Path) -> Result<(), TransportError> {
        if !path.is_file() {
            return Err(TransportError::Playback(format!(
                "audio file {} does not exist",
                path.display()
            )));
        }
        info!("guild {guild}: playing {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn tracks_voice_connections() {
        let transport = LogTransport::new();
        let guild = GuildId::new("1");
        assert!(!transport.is_voice_connected(&guild).await);

        transport
            .connect_voice(&guild, &ChannelId::new("100"))
            .await
            .unwrap();
        assert!(transport.is_voice_connected(&guild).await);

        transport.disconnect_voice(&guild).await;
        assert!(!transport.is_voice_connected(&guild).await);
    }

    #[tokio::test]
    async fn playback_requires_an_existing_file() {
        let dir = TempDir::new().unwrap();
        let transport = LogTransport::new();
        let guild = GuildId::new("1");

        let missing = dir.path().join("missing.mp3");
        assert!(matches!(
            transport.play_audio(&guild, &missing).await,
            Err(TransportError::Playback(_))
        ));

        let present = dir.path().join("chime.mp3");
        std::fs::write(&present, b"riff").unwrap();
        transport.play_audio(&guild, &present).await.unwrap();
    }
}
