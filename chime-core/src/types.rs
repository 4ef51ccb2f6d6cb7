//! Core data model: guild identifiers, per-guild configuration, triggers.

use serde::{Deserialize, Serialize};

/// Unique identifier for a guild (one independent chat server).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GuildId(pub String);

impl GuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a text or voice channel inside a guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Audio asset played when neither the trigger nor the guild overrides it.
pub const DEFAULT_AUDIO_FILE: &str = "chime.mp3";

/// Message template applied to new guilds. `{time}`, `{HH}` and `{mm}` are
/// substituted at fire time.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "⏰ It's {time}.";

/// Per-guild configuration record.
///
/// Created lazily with defaults on first interaction. `triggers` order is
/// significant: user-facing indices are 1-based positions in this vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Human-readable guild name, used by the exported file and the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Destination for text notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_channel: Option<ChannelId>,
    /// Voice channel chimes are played into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_channel: Option<ChannelId>,
    /// Audio file name, relative to the audio asset directory.
    #[serde(default = "default_audio_file")]
    pub audio_file: String,
    /// Whether text notifications are posted at all.
    #[serde(default = "default_true")]
    pub text_enabled: bool,
    /// Message template with `{time}`/`{HH}`/`{mm}` placeholders.
    #[serde(default = "default_message_template")]
    pub message_template: String,
    /// IANA timezone name; `None` falls back to the process-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Scheduled triggers, in display order.
    #[serde(default)]
    pub triggers: Vec<TriggerEntry>,
}

fn default_audio_file() -> String {
    DEFAULT_AUDIO_FILE.to_string()
}

fn default_message_template() -> String {
    DEFAULT_MESSAGE_TEMPLATE.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            text_channel: None,
            voice_channel: None,
            audio_file: default_audio_file(),
            text_enabled: true,
            message_template: default_message_template(),
            timezone: None,
            triggers: Vec::new(),
        }
    }
}

/// One scheduled trigger: a six-field cron recurrence plus optional
/// per-trigger overrides of the guild defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEntry {
    /// Canonical recurrence, `sec min hour day month weekday`.
    pub cron: String,
    /// Overrides the guild timezone when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Overrides the guild audio file when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    /// Overrides the guild message template when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
    /// Disabled entries keep their position (and index) but produce no
    /// live job.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TriggerEntry {
    /// Entry with the given recurrence and no overrides.
    pub fn new(cron: impl Into<String>) -> Self {
        Self {
            cron: cron.into(),
            timezone: None,
            audio_file: None,
            message_template: None,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_config_defaults() {
        let cfg = GuildConfig::default();
        assert_eq!(cfg.audio_file, "chime.mp3");
        assert!(cfg.text_enabled);
        assert_eq!(cfg.message_template, "⏰ It's {time}.");
        assert!(cfg.timezone.is_none());
        assert!(cfg.triggers.is_empty());
    }

    #[test]
    fn sparse_document_deserializes_with_defaults() {
        let cfg: GuildConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, GuildConfig::default());

        let cfg: GuildConfig =
            serde_json::from_str(r#"{"triggers":[{"cron":"0 0 9 * * *"}]}"#).unwrap();
        assert_eq!(cfg.triggers.len(), 1);
        assert!(cfg.triggers[0].enabled);
        assert!(cfg.triggers[0].timezone.is_none());
    }

    #[test]
    fn none_fields_are_omitted_from_json() {
        let raw = serde_json::to_string(&GuildConfig::default()).unwrap();
        assert!(!raw.contains("display_name"));
        assert!(!raw.contains("voice_channel"));
        assert!(raw.contains("audio_file"));
    }

    #[test]
    fn ids_display_as_their_inner_string() {
        assert_eq!(GuildId::new("123").to_string(), "123");
        assert_eq!(ChannelId::new("456").as_str(), "456");
    }
}
