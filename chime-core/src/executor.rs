//! Trigger execution: what happens when a chime fires.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::errors::ChimeError;
use crate::template;
use crate::timespec;
use crate::transport::ChatTransport;
use crate::types::{ChannelId, GuildConfig, GuildId, TriggerEntry};

/// Everything one firing needs, resolved ahead of time.
///
/// Resolution happens when jobs are rebuilt (or when a test intent runs),
/// so a later mutation of the guild defaults never leaks into an
/// already-scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChimeAction {
    pub guild: GuildId,
    /// Timezone the fire time is rendered in.
    pub timezone: Tz,
    pub message_template: String,
    /// Audio file name, relative to the executor's asset directory.
    pub audio_file: String,
    pub text_enabled: bool,
    pub text_channel: Option<ChannelId>,
}

impl ChimeAction {
    /// Resolve the effective action for a guild, layering an optional
    /// trigger's overrides over the guild defaults.
    ///
    /// Fails only when the selected timezone name does not parse; the
    /// caller decides whether that skips a job or reaches the user.
    pub fn resolve(
        guild: &GuildId,
        cfg: &GuildConfig,
        trigger: Option<&TriggerEntry>,
        default_tz: Tz,
    ) -> Result<Self, ChimeError> {
        let zone_name = trigger
            .and_then(|t| t.timezone.as_deref())
            .or(cfg.timezone.as_deref());
        let timezone = match zone_name {
            Some(name) => timespec::parse_timezone(name)?,
            None => default_tz,
        };
        Ok(Self {
            guild: guild.clone(),
            timezone,
            message_template: trigger
                .and_then(|t| t.message_template.clone())
                .unwrap_or_else(|| cfg.message_template.clone()),
            audio_file: trigger
                .and_then(|t| t.audio_file.clone())
                .unwrap_or_else(|| cfg.audio_file.clone()),
            text_enabled: cfg.text_enabled,
            text_channel: cfg.text_channel.clone(),
        })
    }
}

/// Runs chime actions against the transport.
pub struct TriggerExecutor {
    transport: Arc<dyn ChatTransport>,
    audio_dir: PathBuf,
}

impl TriggerExecutor {
    pub fn new(transport: Arc<dyn ChatTransport>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            audio_dir: audio_dir.into(),
        }
    }

    /// Absolute path of an audio asset.
    pub fn audio_path(&self, file: &str) -> PathBuf {
        self.audio_dir.join(file)
    }

    /// Scheduled firing. Infallible by contract: a guild without a live
    /// voice connection is skipped silently, text delivery is best effort,
    /// and playback failures are logged without disturbing the job or any
    /// other guild.
    pub async fn fire(&self, action: &ChimeAction) {
        if !self.transport.is_voice_connected(&action.guild).await {
            debug!("guild {}: no voice connection, skipping chime", action.guild);
            return;
        }

        self.post_text(action).await;

        let path = self.audio_path(&action.audio_file);
        match self.transport.play_audio(&action.guild, &path).await {
            Ok(()) => debug!("guild {}: played {}", action.guild, action.audio_file),
            Err(error) => warn!("guild {}: {error}", action.guild),
        }
    }

    /// Interactive run for the test intents. Unlike scheduled firing, a
    /// missing voice connection is an error unless a channel to join is
    /// known, and playback failures surface to the caller.
    pub async fn run_now(
        &self,
        action: &ChimeAction,
        voice_channel: Option<&ChannelId>,
    ) -> Result<(), ChimeError> {
        if !self.transport.is_voice_connected(&action.guild).await {
            let Some(channel) = voice_channel else {
                return Err(ChimeError::NotConnected(
                    "no voice channel configured; run join first",
                ));
            };
            self.transport.connect_voice(&action.guild, channel).await?;
        }

        self.post_text(action).await;

        self.transport
            .play_audio(&action.guild, &self.audio_path(&action.audio_file))
            .await?;
        Ok(())
    }

    async fn post_text(&self, action: &ChimeAction) {
        if !action.text_enabled {
            return;
        }
        let Some(channel) = &action.text_channel else {
            return;
        };
        let now = Utc::now().with_timezone(&action.timezone);
        let text = template::render(&action.message_template, now.hour(), now.minute());
        if let Err(error) = self.transport.send_text(channel, &text).await {
            warn!("guild {}: text notification failed: {error}", action.guild);
        }
    }
}
