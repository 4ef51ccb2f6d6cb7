//! Projection between [`GuildConfig`] and the per-guild INI file, plus the
//! operator-facing catalog document.
//!
//! The file is the human-editable face of a guild's configuration. Export
//! is total: every field is written, including a resolved timezone, so the
//! operator always sees concrete values. Import is a sparse overlay: scalar
//! keys apply only when present and non-empty, and `[time.N]` sections
//! replace the trigger list wholesale once at least one entry parses.
//! Unparsable pieces are skipped with a warning; an import never fails the
//! guild outright.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::StoreError;
use crate::inifile::{IniDocument, IniSection};
use crate::timespec;
use crate::types::{ChannelId, GuildConfig, GuildId, TriggerEntry};

/// File name of the catalog document inside the config directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Catalog key recording the most recently exported guild.
const ACTIVE_GUILD_KEY: &str = "_active_guild_id";

/// Path of the per-guild config file inside `dir`.
pub fn guild_file_path(dir: &Path, id: &GuildId) -> PathBuf {
    dir.join(format!("{}.ini", id.as_str()))
}

/// Serialize `cfg` to `<dir>/<id>.ini`, creating `dir` as needed. Returns
/// the written path.
pub fn export_guild(
    dir: &Path,
    id: &GuildId,
    cfg: &GuildConfig,
    default_tz: Tz,
) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir)?;

    let zone = cfg
        .timezone
        .clone()
        .unwrap_or_else(|| default_tz.name().to_string());

    let mut hhmm_times = Vec::new();
    let mut advanced = Vec::new();
    for trigger in &cfg.triggers {
        match timespec::cron_to_hhmm(&trigger.cron) {
            Some(hhmm) => hhmm_times.push(hhmm),
            None => advanced.push(trigger.cron.clone()),
        }
    }

    let mut doc = IniDocument::new();
    let general = doc.push_section("general");
    general.set(
        "server_name",
        cfg.display_name.clone().unwrap_or_else(|| id.as_str().to_string()),
    );
    general.set("timezone", zone.as_str());
    general.set("text_enabled", if cfg.text_enabled { "true" } else { "false" });
    general.set("audio_file", cfg.audio_file.as_str());
    general.set("message_template", cfg.message_template.as_str());
    general.set(
        "text_channel_id",
        cfg.text_channel.as_ref().map(ChannelId::as_str).unwrap_or(""),
    );
    general.set(
        "voice_channel_id",
        cfg.voice_channel.as_ref().map(ChannelId::as_str).unwrap_or(""),
    );
    // Legacy mirrors for tooling that only reads [general].
    general.set("times", hhmm_times.join(","));
    general.set("advanced_cron", advanced.join(","));

    for (i, trigger) in cfg.triggers.iter().enumerate() {
        let section = doc.push_section(format!("time.{}", i + 1));
        match timespec::cron_to_hhmm(&trigger.cron) {
            Some(hhmm) => section.set("time", hhmm),
            None => section.set("cron", trigger.cron.as_str()),
        }
        if let Some(tz) = &trigger.timezone {
            section.set("tz", tz.as_str());
        }
        if let Some(audio) = &trigger.audio_file {
            section.set("audio", audio.as_str());
        }
        if let Some(message) = &trigger.message_template {
            section.set("message", message.as_str());
        }
        if !trigger.enabled {
            section.set("enabled", "false");
        }
    }

    let path = guild_file_path(dir, id);
    fs::write(&path, doc.render())?;
    debug!("exported config for guild {id} to {}", path.display());
    Ok(path)
}

/// Raw config file content for `id`, if one exists and is readable.
pub fn read_guild_file(dir: &Path, id: &GuildId) -> Option<String> {
    let path = guild_file_path(dir, id);
    match fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(error) if error.kind() == ErrorKind::NotFound => None,
        Err(error) => {
            warn!("failed to read {}: {error}", path.display());
            None
        }
    }
}

/// Apply a config file's content to `cfg`.
///
/// Scalar keys under `[general]` overlay the current values only when
/// present and non-empty. Triggers come from `[time.N]` sections when any
/// exist (ordered by N, duplicates last-wins), otherwise from the legacy
/// `times`/`advanced_cron` comma lists; either way the trigger list is
/// replaced only when at least one entry parses, so a broken edit keeps
/// the previous schedule.
pub fn apply_guild_file(id: &GuildId, content: &str, cfg: &mut GuildConfig) {
    let doc = IniDocument::parse(content);

    if let Some(general) = doc.section("general") {
        if let Some(name) = general.get_non_empty("server_name") {
            cfg.display_name = Some(name.to_string());
        }
        if let Some(zone) = general.get_non_empty("timezone") {
            match timespec::parse_timezone(zone) {
                Ok(_) => cfg.timezone = Some(zone.to_string()),
                Err(_) => warn!("guild {id}: ignoring unknown timezone '{zone}'"),
            }
        }
        if let Some(value) = general.get_non_empty("text_enabled") {
            match parse_bool(value) {
                Some(enabled) => cfg.text_enabled = enabled,
                None => warn!("guild {id}: ignoring non-boolean text_enabled '{value}'"),
            }
        }
        if let Some(file) = general.get_non_empty("audio_file") {
            cfg.audio_file = file.to_string();
        }
        if let Some(template) = general.get_non_empty("message_template") {
            cfg.message_template = template.to_string();
        }
        if let Some(channel) = general.get_non_empty("text_channel_id") {
            cfg.text_channel = Some(ChannelId::new(channel));
        }
        if let Some(channel) = general.get_non_empty("voice_channel_id") {
            cfg.voice_channel = Some(ChannelId::new(channel));
        }
    }

    match collect_indexed_triggers(id, &doc) {
        IndexedTriggers::Present(entries) if !entries.is_empty() => {
            cfg.triggers = entries;
        }
        IndexedTriggers::Present(_) => {
            warn!("guild {id}: every [time.N] section was invalid; keeping existing triggers");
        }
        IndexedTriggers::Absent => {
            if let Some(entries) = collect_legacy_triggers(id, &doc) {
                cfg.triggers = entries;
            }
        }
    }
}

enum IndexedTriggers {
    /// At least one `[time.N]` section exists; holds those that parsed.
    Present(Vec<TriggerEntry>),
    Absent,
}

fn collect_indexed_triggers(id: &GuildId, doc: &IniDocument) -> IndexedTriggers {
    let mut found = false;
    let mut by_index: BTreeMap<usize, TriggerEntry> = BTreeMap::new();

    for section in &doc.sections {
        let Some(rest) = section.name.strip_prefix("time.") else {
            continue;
        };
        found = true;
        let index = match rest.parse::<usize>() {
            Ok(i) if i >= 1 => i,
            _ => {
                warn!("guild {id}: ignoring section [time.{rest}] (index must be a positive number)");
                continue;
            }
        };
        if let Some(entry) = parse_trigger_section(id, index, section) {
            by_index.insert(index, entry);
        }
    }

    if found {
        IndexedTriggers::Present(by_index.into_values().collect())
    } else {
        IndexedTriggers::Absent
    }
}

fn parse_trigger_section(id: &GuildId, index: usize, section: &IniSection) -> Option<TriggerEntry> {
    let cron = if let Some(hhmm) = section.get_non_empty("time") {
        match timespec::hhmm_to_cron(hhmm) {
            Some(cron) => cron,
            None => {
                warn!("guild {id}: [time.{index}] has invalid time '{hhmm}', dropping entry");
                return None;
            }
        }
    } else if let Some(expr) = section.get_non_empty("cron") {
        if let Err(error) = timespec::validate_cron(expr) {
            warn!("guild {id}: [time.{index}] dropped: {error}");
            return None;
        }
        timespec::canonicalize_cron(expr)
    } else {
        warn!("guild {id}: [time.{index}] has neither time nor cron, dropping entry");
        return None;
    };

    let timezone = section.get_non_empty("tz").and_then(|zone| {
        match timespec::parse_timezone(zone) {
            Ok(_) => Some(zone.to_string()),
            Err(_) => {
                warn!("guild {id}: [time.{index}] has unknown tz '{zone}', using the guild zone");
                None
            }
        }
    });

    let enabled = match section.get_non_empty("enabled") {
        Some(value) => parse_bool(value).unwrap_or_else(|| {
            warn!("guild {id}: [time.{index}] has non-boolean enabled '{value}', keeping it enabled");
            true
        }),
        None => true,
    };

    Some(TriggerEntry {
        cron,
        timezone,
        audio_file: section.get_non_empty("audio").map(str::to_string),
        message_template: section.get_non_empty("message").map(str::to_string),
        enabled,
    })
}

fn collect_legacy_triggers(id: &GuildId, doc: &IniDocument) -> Option<Vec<TriggerEntry>> {
    let general = doc.section("general")?;
    let mut entries = Vec::new();
    let mut saw_any = false;

    if let Some(times) = general.get_non_empty("times") {
        for item in times.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            saw_any = true;
            match timespec::hhmm_to_cron(item) {
                Some(cron) => entries.push(TriggerEntry::new(cron)),
                None => warn!("guild {id}: skipping invalid legacy time '{item}'"),
            }
        }
    }
    if let Some(exprs) = general.get_non_empty("advanced_cron") {
        for item in exprs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            saw_any = true;
            match timespec::validate_cron(item) {
                Ok(()) => entries.push(TriggerEntry::new(timespec::canonicalize_cron(item))),
                Err(error) => warn!("guild {id}: skipping legacy cron entry: {error}"),
            }
        }
    }

    if entries.is_empty() {
        if saw_any {
            warn!("guild {id}: no valid legacy time entries; keeping existing triggers");
        }
        return None;
    }
    Some(entries)
}

/// Boolean spellings accepted in config files: 1/true/yes/on and
/// 0/false/no/off, case-insensitive.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    catalog: BTreeMap<String, String>,
}

/// Create an empty catalog document if none exists yet, so operators find
/// the file even before the first guild is exported.
pub fn ensure_catalog(dir: &Path) -> Result<PathBuf, StoreError> {
    let path = dir.join(CATALOG_FILE);
    if !path.exists() {
        fs::create_dir_all(dir)?;
        let mut doc = CatalogDocument::default();
        doc.catalog
            .insert(ACTIVE_GUILD_KEY.to_string(), "(none)".to_string());
        fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    }
    Ok(path)
}

/// Record `id`'s exported file in `<dir>/catalog.json` under the guild's
/// display name, and mark it as the most recent export. An unreadable
/// catalog is rebuilt rather than treated as fatal.
pub fn update_catalog(dir: &Path, id: &GuildId, cfg: &GuildConfig) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(CATALOG_FILE);

    let mut doc = match fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
            warn!("rebuilding unreadable catalog {}: {error}", path.display());
            CatalogDocument::default()
        }),
        Err(_) => CatalogDocument::default(),
    };

    let file_name = format!("{}.ini", id.as_str());
    let display = cfg
        .display_name
        .clone()
        .unwrap_or_else(|| id.as_str().to_string());

    // A renamed guild must not leave a stale name pointing at its file.
    doc.catalog.retain(|_, value| value != &file_name);
    doc.catalog.insert(display, file_name);
    doc.catalog
        .insert(ACTIVE_GUILD_KEY.to_string(), id.as_str().to_string());

    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;
    use tempfile::TempDir;

    const TOKYO: Tz = chrono_tz::Asia::Tokyo;

    fn guild() -> GuildId {
        GuildId::new("123456789")
    }

    fn sample_config() -> GuildConfig {
        GuildConfig {
            display_name: Some("Example Guild".to_string()),
            text_channel: Some(ChannelId::new("200")),
            voice_channel: Some(ChannelId::new("100")),
            audio_file: "bell.mp3".to_string(),
            text_enabled: false,
            message_template: "{HH}:{mm} now".to_string(),
            timezone: Some("America/New_York".to_string()),
            triggers: vec![
                TriggerEntry::new("0 0 9 * * *"),
                TriggerEntry {
                    cron: "0 30 18 * * Mon-Fri".to_string(),
                    timezone: Some("Asia/Tokyo".to_string()),
                    audio_file: Some("gong.mp3".to_string()),
                    message_template: Some("evening {time}".to_string()),
                    enabled: false,
                },
            ],
        }
    }

    // ========================================================================
    // Export
    // ========================================================================

    #[test]
    fn export_writes_every_field() {
        let dir = TempDir::new().unwrap();
        let path = export_guild(dir.path(), &guild(), &sample_config(), TOKYO).unwrap();
        assert_eq!(path, dir.path().join("123456789.ini"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("server_name = Example Guild"));
        assert!(content.contains("timezone = America/New_York"));
        assert!(content.contains("text_enabled = false"));
        assert!(content.contains("audio_file = bell.mp3"));
        assert!(content.contains("text_channel_id = 200"));
        assert!(content.contains("voice_channel_id = 100"));
        assert!(content.contains("times = 09:00"));
        assert!(content.contains("advanced_cron = 0 30 18 * * Mon-Fri"));
        assert!(content.contains("[time.1]"));
        assert!(content.contains("time = 09:00"));
        assert!(content.contains("[time.2]"));
        assert!(content.contains("cron = 0 30 18 * * Mon-Fri"));
        assert!(content.contains("tz = Asia/Tokyo"));
        assert!(content.contains("audio = gong.mp3"));
        assert!(content.contains("message = evening {time}"));
        assert!(content.contains("enabled = false"));
    }

    #[test]
    fn export_resolves_missing_timezone_to_default() {
        let dir = TempDir::new().unwrap();
        let cfg = GuildConfig::default();
        let path = export_guild(dir.path(), &guild(), &cfg, TOKYO).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("timezone = Asia/Tokyo"));
        assert!(content.contains("server_name = 123456789"));
    }

    // ========================================================================
    // Import
    // ========================================================================

    #[test]
    fn import_round_trips_exported_config() {
        let dir = TempDir::new().unwrap();
        let original = sample_config();
        export_guild(dir.path(), &guild(), &original, TOKYO).unwrap();

        let content = read_guild_file(dir.path(), &guild()).unwrap();
        let mut imported = GuildConfig::default();
        apply_guild_file(&guild(), &content, &mut imported);
        assert_eq!(imported, original);
    }

    #[test]
    fn sparse_file_overlays_only_present_keys() {
        let mut cfg = sample_config();
        apply_guild_file(&guild(), "[general]\naudio_file = other.mp3\n", &mut cfg);

        assert_eq!(cfg.audio_file, "other.mp3");
        // Everything not mentioned is untouched, including the triggers.
        assert_eq!(cfg.display_name.as_deref(), Some("Example Guild"));
        assert_eq!(cfg.triggers.len(), 2);
    }

    #[test]
    fn empty_values_do_not_clear_fields() {
        let mut cfg = sample_config();
        apply_guild_file(
            &guild(),
            "[general]\ntext_channel_id =\nmessage_template =\n",
            &mut cfg,
        );
        assert_eq!(cfg.text_channel.as_ref().unwrap().as_str(), "200");
        assert_eq!(cfg.message_template, "{HH}:{mm} now");
    }

    #[test]
    fn unknown_timezone_is_dropped_with_other_keys_applied() {
        let mut cfg = GuildConfig::default();
        apply_guild_file(
            &guild(),
            "[general]\ntimezone = Nowhere/Nope\naudio_file = bell.mp3\n",
            &mut cfg,
        );
        assert!(cfg.timezone.is_none());
        assert_eq!(cfg.audio_file, "bell.mp3");
    }

    #[test]
    fn indexed_sections_replace_triggers_in_order() {
        let mut cfg = sample_config();
        apply_guild_file(
            &guild(),
            "[time.2]\ntime = 18:00\n\n[time.1]\ntime = 06:15\n",
            &mut cfg,
        );
        assert_eq!(cfg.triggers.len(), 2);
        assert_eq!(cfg.triggers[0].cron, "0 15 6 * * *");
        assert_eq!(cfg.triggers[1].cron, "0 0 18 * * *");
    }

    #[test]
    fn invalid_entry_is_skipped_but_rest_applies() {
        let mut cfg = GuildConfig::default();
        apply_guild_file(
            &guild(),
            "[time.1]\ntime = 99:99\n\n[time.2]\ntime = 09:00\n\n[time.3]\ncron = nope\n",
            &mut cfg,
        );
        assert_eq!(cfg.triggers.len(), 1);
        assert_eq!(cfg.triggers[0].cron, "0 0 9 * * *");
    }

    #[test]
    fn all_invalid_sections_keep_previous_triggers() {
        let mut cfg = sample_config();
        apply_guild_file(&guild(), "[time.1]\ntime = nope\n", &mut cfg);
        assert_eq!(cfg.triggers, sample_config().triggers);
    }

    #[test]
    fn trigger_with_unknown_tz_keeps_entry_without_override() {
        let mut cfg = GuildConfig::default();
        apply_guild_file(
            &guild(),
            "[time.1]\ntime = 09:00\ntz = Nowhere/Nope\n",
            &mut cfg,
        );
        assert_eq!(cfg.triggers.len(), 1);
        assert!(cfg.triggers[0].timezone.is_none());
    }

    #[test]
    fn disabled_flag_round_trips() {
        let mut cfg = GuildConfig::default();
        apply_guild_file(
            &guild(),
            "[time.1]\ntime = 09:00\nenabled = off\n",
            &mut cfg,
        );
        assert!(!cfg.triggers[0].enabled);
    }

    #[test]
    fn legacy_lists_used_when_no_indexed_sections() {
        let mut cfg = GuildConfig::default();
        apply_guild_file(
            &guild(),
            "[general]\ntimes = 09:00, 18:30, nope\nadvanced_cron = 0 0 12 * * Mon\n",
            &mut cfg,
        );
        assert_eq!(cfg.triggers.len(), 3);
        assert_eq!(cfg.triggers[0].cron, "0 0 9 * * *");
        assert_eq!(cfg.triggers[1].cron, "0 30 18 * * *");
        assert_eq!(cfg.triggers[2].cron, "0 0 12 * * Mon");
        assert!(cfg.triggers.iter().all(|t| t.timezone.is_none()));
    }

    #[test]
    fn indexed_sections_shadow_legacy_lists() {
        let mut cfg = GuildConfig::default();
        apply_guild_file(
            &guild(),
            "[general]\ntimes = 06:00\n\n[time.1]\ntime = 09:00\n",
            &mut cfg,
        );
        assert_eq!(cfg.triggers.len(), 1);
        assert_eq!(cfg.triggers[0].cron, "0 0 9 * * *");
    }

    #[test]
    fn read_guild_file_distinguishes_missing() {
        let dir = TempDir::new().unwrap();
        assert!(read_guild_file(dir.path(), &guild()).is_none());
        export_guild(dir.path(), &guild(), &GuildConfig::default(), TOKYO).unwrap();
        assert!(read_guild_file(dir.path(), &guild()).is_some());
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    #[test]
    fn catalog_records_display_name_and_active_guild() {
        let dir = TempDir::new().unwrap();
        let cfg = sample_config();
        update_catalog(dir.path(), &guild(), &cfg).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(CATALOG_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["catalog"]["Example Guild"], "123456789.ini");
        assert_eq!(doc["catalog"]["_active_guild_id"], "123456789");
    }

    #[test]
    fn catalog_drops_stale_names_for_renamed_guild() {
        let dir = TempDir::new().unwrap();
        let mut cfg = sample_config();
        update_catalog(dir.path(), &guild(), &cfg).unwrap();
        cfg.display_name = Some("Renamed".to_string());
        update_catalog(dir.path(), &guild(), &cfg).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(CATALOG_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(doc["catalog"].get("Example Guild").is_none());
        assert_eq!(doc["catalog"]["Renamed"], "123456789.ini");
    }

    #[test]
    fn ensure_catalog_writes_placeholder_once() {
        let dir = TempDir::new().unwrap();
        let path = ensure_catalog(dir.path()).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"_active_guild_id\": \"(none)\""));

        update_catalog(dir.path(), &guild(), &sample_config()).unwrap();
        ensure_catalog(dir.path()).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("123456789"));
    }
}
