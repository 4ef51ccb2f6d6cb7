//! Structured user intents and plain-text replies.
//!
//! A command layer (platform gateway, admin tool, test) parses whatever its
//! surface looks like into an [`Intent`]; the service executes it against
//! one guild and answers with a [`Reply`]. Keeping the surface structured
//! means the engine never sees platform command syntax.

use crate::types::{ChannelId, GuildId};

/// A structured command aimed at one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Join a voice channel and remember both destinations.
    Join {
        voice_channel: ChannelId,
        text_channel: ChannelId,
        display_name: Option<String>,
    },
    /// Leave the voice channel. Triggers stay registered and resume firing
    /// after the next join.
    Leave,
    /// Set the guild default audio file.
    SetAudio { file: String },
    /// Set the guild default message template.
    SetMessage { template: String },
    /// Set the text notification destination.
    SetTextChannel { channel: ChannelId },
    /// Set the voice destination without connecting; the next join or test
    /// connects there.
    SetVoiceChannel { channel: ChannelId },
    /// Turn text notifications on or off.
    ToggleText { enabled: bool },
    /// Register a new trigger from exactly one of `time` (HH:mm) or `cron`
    /// (six fields), with optional per-trigger overrides.
    AddTrigger {
        time: Option<String>,
        cron: Option<String>,
        timezone: Option<String>,
        message: Option<String>,
        file: Option<String>,
    },
    /// Set a per-trigger audio override (1-based index).
    SetTriggerAudio { index: usize, file: String },
    /// Set a per-trigger message override (1-based index).
    SetTriggerMessage { index: usize, template: String },
    /// Enable or disable one trigger without removing it.
    EnableTrigger { index: usize, enabled: bool },
    /// Remove one trigger; later entries shift down by one.
    RemoveTrigger { index: usize },
    /// Render the current settings summary.
    List,
    /// Immediately run a chime with the guild defaults.
    Test,
    /// Immediately run a chime with one trigger's overrides.
    TestTrigger { index: usize },
    /// Re-read the guild's config file and reconcile.
    SyncFromFile,
    /// Write the guild's config file and report its path.
    ExportFile,
    /// Copy schedule and defaults (not channel wiring) to other guilds.
    CopyTo { targets: CopyTargets },
}

/// Target selection for [`Intent::CopyTo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyTargets {
    /// Every other guild known to the store.
    All,
    /// An explicit list; the source guild is skipped if listed.
    Guilds(Vec<GuildId>),
}

/// Plain-text reply routed back through the caller's reply mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply(String);

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
