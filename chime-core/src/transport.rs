//! Outbound chat/voice transport seam.
//!
//! The engine never talks to a chat platform directly; everything outbound
//! goes through [`ChatTransport`]. A gateway integration implements it with
//! real platform calls; [`MockTransport`] is the deterministic in-memory
//! implementation used by tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::types::{ChannelId, GuildId};

/// Chat and voice capability consumed by the executor and intent handlers.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Join (or move to) a voice channel on behalf of the guild.
    async fn connect_voice(
        &self,
        guild: &GuildId,
        channel: &ChannelId,
    ) -> Result<(), TransportError>;

    /// Leave the guild's voice channel. Disconnecting twice is a no-op.
    async fn disconnect_voice(&self, guild: &GuildId);

    /// Whether the guild currently has a live voice connection.
    async fn is_voice_connected(&self, guild: &GuildId) -> bool;

    /// Post a text message.
    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<(), TransportError>;

    /// Play an audio file into the guild's voice connection, resolving when
    /// playback finishes or fails.
    async fn play_audio(&self, guild: &GuildId, path: &Path) -> Result<(), TransportError>;
}

/// A call observed by [`MockTransport`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    ConnectVoice { guild: GuildId, channel: ChannelId },
    DisconnectVoice { guild: GuildId },
    SendText { channel: ChannelId, text: String },
    PlayAudio { guild: GuildId, path: PathBuf },
}

#[derive(Debug, Clone, Copy, Default)]
struct FailureModes {
    connect: bool,
    send: bool,
    playback: bool,
}

/// Deterministic in-memory transport.
///
/// Records every outbound action and can be scripted to fail specific
/// operations. Connection state is tracked like the real thing: a
/// successful connect makes `is_voice_connected` true until disconnect.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    connected: Arc<Mutex<HashSet<GuildId>>>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
    failures: Arc<Mutex<FailureModes>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the guild already has a live voice connection.
    pub fn set_connected(&self, guild: &GuildId) {
        self.connected
            .lock()
            .expect("mutex poisoned")
            .insert(guild.clone());
    }

    pub fn fail_connect(&self, fail: bool) {
        self.failures.lock().expect("mutex poisoned").connect = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.failures.lock().expect("mutex poisoned").send = fail;
    }

    pub fn fail_playback(&self, fail: bool) {
        self.failures.lock().expect("mutex poisoned").playback = fail;
    }

    /// Snapshot of every recorded call.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().expect("mutex poisoned").clone()
    }

    /// Number of audio playbacks recorded for `guild`.
    pub fn play_count(&self, guild: &GuildId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::PlayAudio { guild: g, .. } if g == guild))
            .count()
    }

    /// Text bodies sent so far, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::SendText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().expect("mutex poisoned").push(call);
    }

    fn failures(&self) -> FailureModes {
        *self.failures.lock().expect("mutex poisoned")
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn connect_voice(
        &self,
        guild: &GuildId,
        channel: &ChannelId,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::ConnectVoice {
            guild: guild.clone(),
            channel: channel.clone(),
        });
        if self.failures().connect {
            return Err(TransportError::Connect("scripted connect failure".into()));
        }
        self.connected
            .lock()
            .expect("mutex poisoned")
            .insert(guild.clone());
        Ok(())
    }

    async fn disconnect_voice(&self, guild: &GuildId) {
        self.record(TransportCall::DisconnectVoice {
            guild: guild.clone(),
        });
        self.connected
            .lock()
            .expect("mutex poisoned")
            .remove(guild);
    }

    async fn is_voice_connected(&self, guild: &GuildId) -> bool {
        self.connected
            .lock()
            .expect("mutex poisoned")
            .contains(guild)
    }

    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<(), TransportError> {
        self.record(TransportCall::SendText {
            channel: channel.clone(),
            text: text.to_string(),
        });
        if self.failures().send {
            return Err(TransportError::Send("scripted send failure".into()));
        }
        Ok(())
    }

    async fn play_audio(&self, guild: &GuildId, path: &Path) -> Result<(), TransportError> {
        self.record(TransportCall::PlayAudio {
            guild: guild.clone(),
            path: path.to_path_buf(),
        });
        if self.failures().playback {
            return Err(TransportError::Playback("scripted playback failure".into()));
        }
        Ok(())
    }
}
