//! Service facade: owns the store, scheduler, executor and file projection,
//! and routes every mutation through one pipeline.
//!
//! The pipeline order is fixed: persist to the store, export the guild's
//! config file (stamping the self-write), refresh the catalog, rebuild the
//! guild's jobs. File-sourced changes run the same pipeline minus the
//! export, so an operator's file is never clobbered by its own import.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::configfile;
use crate::errors::ChimeError;
use crate::executor::{ChimeAction, TriggerExecutor};
use crate::intents::{CopyTargets, Intent, Reply};
use crate::scheduler::ChimeScheduler;
use crate::store::GuildStore;
use crate::timespec;
use crate::transport::ChatTransport;
use crate::types::{ChannelId, GuildConfig, GuildId, TriggerEntry};
use crate::watcher::WriteStamps;

/// Filesystem roots the service projects into.
#[derive(Debug, Clone)]
pub struct ServicePaths {
    /// Directory of per-guild `.ini` files and the catalog.
    pub config_dir: PathBuf,
    /// Directory of audio assets.
    pub audio_dir: PathBuf,
}

/// The reconciliation engine behind every entry point: structured intents,
/// config file change events, and startup bootstrap.
pub struct ChimeService {
    store: GuildStore,
    scheduler: ChimeScheduler,
    executor: Arc<TriggerExecutor>,
    transport: Arc<dyn ChatTransport>,
    paths: ServicePaths,
    default_tz: Tz,
    debounce: Duration,
    stamps: WriteStamps,
}

impl ChimeService {
    pub fn new(
        store: GuildStore,
        transport: Arc<dyn ChatTransport>,
        paths: ServicePaths,
        default_tz: Tz,
        debounce: Duration,
    ) -> Self {
        let executor = Arc::new(TriggerExecutor::new(
            Arc::clone(&transport),
            paths.audio_dir.clone(),
        ));
        let scheduler = ChimeScheduler::new(Arc::clone(&executor), default_tz);
        Self {
            store,
            scheduler,
            executor,
            transport,
            paths,
            default_tz,
            debounce,
            stamps: WriteStamps::new(),
        }
    }

    pub fn store(&self) -> &GuildStore {
        &self.store
    }

    pub fn scheduler(&self) -> &ChimeScheduler {
        &self.scheduler
    }

    /// Derive live state for every stored guild. A present config file wins
    /// over the store (the operator may have edited it while the daemon was
    /// down); a missing one is created from the store. Digit-named files with
    /// no stored guild provision one, same as dropping the file while the
    /// daemon runs. Per-guild problems degrade to warnings so one bad guild
    /// cannot block the rest.
    pub fn bootstrap(&self) {
        if let Err(error) = configfile::ensure_catalog(&self.paths.config_dir) {
            warn!("could not create catalog: {error}");
        }

        let mut guilds = self.store.guild_ids();
        let provisioned = self.provisioned_guilds();
        if !provisioned.is_empty() {
            info!(
                "found {} pre-provisioned config file(s) without a stored guild",
                provisioned.len()
            );
            guilds.extend(provisioned);
        }
        info!("bootstrapping {} guild(s)", guilds.len());
        for guild in guilds {
            match configfile::read_guild_file(&self.paths.config_dir, &guild) {
                Some(content) => {
                    let applied = self.store.mutate(&guild, |cfg| {
                        configfile::apply_guild_file(&guild, &content, cfg);
                    });
                    match applied {
                        Ok(()) => debug!("guild {guild}: applied config file over stored state"),
                        Err(error) => {
                            warn!("guild {guild}: could not persist imported config: {error}");
                        }
                    }
                    if let Err(error) = self.refresh_catalog(&guild) {
                        warn!("guild {guild}: catalog update failed: {error}");
                    }
                }
                None => {
                    if let Err(error) = self.export_guild_file(&guild) {
                        warn!("guild {guild}: initial export failed: {error}");
                    }
                }
            }
            let jobs = self.rebuild(&guild);
            info!("guild {guild}: {jobs} trigger job(s) live");
        }
    }

    /// Execute one structured intent for `guild` and produce a reply.
    ///
    /// Mutating intents persist, re-export the guild's file and rebuild its
    /// jobs before returning; validation failures change nothing.
    pub async fn handle_intent(&self, guild: &GuildId, intent: Intent) -> Result<Reply, ChimeError> {
        match intent {
            Intent::Join {
                voice_channel,
                text_channel,
                display_name,
            } => {
                self.store.mutate(guild, |cfg| {
                    cfg.voice_channel = Some(voice_channel.clone());
                    cfg.text_channel = Some(text_channel.clone());
                    if let Some(name) = &display_name {
                        cfg.display_name = Some(name.clone());
                    }
                })?;
                self.after_mutation(guild)?;
                self.transport.connect_voice(guild, &voice_channel).await?;
                Ok(Reply::new(format!(
                    "Joined voice channel {voice_channel}; notifications go to {text_channel}."
                )))
            }

            Intent::Leave => {
                self.transport.disconnect_voice(guild).await;
                self.store.mutate(guild, |cfg| cfg.voice_channel = None)?;
                self.after_mutation(guild)?;
                Ok(Reply::new("Left the voice channel."))
            }

            Intent::SetAudio { file } => {
                self.validate_audio_file(&file)?;
                self.store.mutate(guild, |cfg| cfg.audio_file = file.clone())?;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!("Default audio set to {file}.")))
            }

            Intent::SetMessage { template } => {
                self.store
                    .mutate(guild, |cfg| cfg.message_template = template.clone())?;
                self.after_mutation(guild)?;
                Ok(Reply::new("Default message template updated."))
            }

            Intent::SetTextChannel { channel } => {
                self.store
                    .mutate(guild, |cfg| cfg.text_channel = Some(channel.clone()))?;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!(
                    "Text notifications will be posted to {channel}."
                )))
            }

            Intent::SetVoiceChannel { channel } => {
                self.store
                    .mutate(guild, |cfg| cfg.voice_channel = Some(channel.clone()))?;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!("Chimes will play in {channel}.")))
            }

            Intent::ToggleText { enabled } => {
                self.store.mutate(guild, |cfg| cfg.text_enabled = enabled)?;
                self.after_mutation(guild)?;
                Ok(Reply::new(if enabled {
                    "Text notifications enabled."
                } else {
                    "Text notifications disabled."
                }))
            }

            Intent::AddTrigger {
                time,
                cron,
                timezone,
                message,
                file,
            } => {
                let cron = match (time, cron) {
                    (Some(_), Some(_)) => return Err(ChimeError::AmbiguousTimeSpec),
                    (None, None) => return Err(ChimeError::MissingTimeSpec),
                    (Some(hhmm), None) => match timespec::hhmm_to_cron(&hhmm) {
                        Some(cron) => cron,
                        None => return Err(ChimeError::InvalidTime(hhmm)),
                    },
                    (None, Some(expr)) => {
                        timespec::validate_cron(&expr)?;
                        timespec::canonicalize_cron(&expr)
                    }
                };
                if let Some(zone) = &timezone {
                    timespec::parse_timezone(zone)?;
                }
                if let Some(file) = &file {
                    self.validate_audio_file(file)?;
                }

                let entry = TriggerEntry {
                    cron,
                    timezone,
                    audio_file: file,
                    message_template: message,
                    enabled: true,
                };
                let (index, shown, zone) = self.store.mutate(guild, |cfg| {
                    let shown =
                        timespec::cron_to_hhmm(&entry.cron).unwrap_or_else(|| entry.cron.clone());
                    let zone = entry
                        .timezone
                        .clone()
                        .or_else(|| cfg.timezone.clone())
                        .unwrap_or_else(|| self.default_tz.name().to_string());
                    cfg.triggers.push(entry);
                    (cfg.triggers.len(), shown, zone)
                })?;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!("Added trigger {index}: {shown} ({zone}).")))
            }

            Intent::SetTriggerAudio { index, file } => {
                self.validate_audio_file(&file)?;
                self.store.mutate(guild, |cfg| {
                    trigger_at(cfg, index).map(|entry| entry.audio_file = Some(file.clone()))
                })??;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!("Trigger {index} now plays {file}.")))
            }

            Intent::SetTriggerMessage { index, template } => {
                self.store.mutate(guild, |cfg| {
                    trigger_at(cfg, index)
                        .map(|entry| entry.message_template = Some(template.clone()))
                })??;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!("Trigger {index} message updated.")))
            }

            Intent::EnableTrigger { index, enabled } => {
                self.store.mutate(guild, |cfg| {
                    trigger_at(cfg, index).map(|entry| entry.enabled = enabled)
                })??;
                self.after_mutation(guild)?;
                Ok(Reply::new(format!(
                    "Trigger {index} {}.",
                    if enabled { "enabled" } else { "disabled" }
                )))
            }

            Intent::RemoveTrigger { index } => {
                let removed = self.store.mutate(guild, |cfg| {
                    let len = cfg.triggers.len();
                    if index == 0 || index > len {
                        return Err(ChimeError::TriggerIndexOutOfRange { index, len });
                    }
                    Ok(cfg.triggers.remove(index - 1))
                })??;
                self.after_mutation(guild)?;
                let shown = timespec::cron_to_hhmm(&removed.cron).unwrap_or(removed.cron);
                Ok(Reply::new(format!("Removed trigger {index} ({shown}).")))
            }

            Intent::List => {
                let cfg = self.store.get_or_create(guild)?;
                Ok(Reply::new(render_settings(&cfg, self.default_tz)))
            }

            Intent::Test => {
                let cfg = self.store.get_or_create(guild)?;
                let action = ChimeAction::resolve(guild, &cfg, None, self.default_tz)?;
                self.executor
                    .run_now(&action, cfg.voice_channel.as_ref())
                    .await?;
                Ok(Reply::new("Test chime finished."))
            }

            Intent::TestTrigger { index } => {
                let cfg = self.store.get_or_create(guild)?;
                let len = cfg.triggers.len();
                if index == 0 || index > len {
                    return Err(ChimeError::TriggerIndexOutOfRange { index, len });
                }
                let trigger = &cfg.triggers[index - 1];
                let action = ChimeAction::resolve(guild, &cfg, Some(trigger), self.default_tz)?;
                self.executor
                    .run_now(&action, cfg.voice_channel.as_ref())
                    .await?;
                Ok(Reply::new(format!("Test chime for trigger {index} finished.")))
            }

            Intent::SyncFromFile => {
                let path = configfile::guild_file_path(&self.paths.config_dir, guild);
                match configfile::read_guild_file(&self.paths.config_dir, guild) {
                    Some(content) => {
                        self.store.mutate(guild, |cfg| {
                            configfile::apply_guild_file(guild, &content, cfg);
                        })?;
                        self.refresh_catalog(guild)?;
                        self.rebuild(guild);
                        Ok(Reply::new(format!("Settings reloaded from {}.", path.display())))
                    }
                    None => Ok(Reply::new(format!(
                        "No config file found (expected {}).",
                        path.display()
                    ))),
                }
            }

            Intent::ExportFile => {
                let path = self.export_guild_file(guild)?;
                self.rebuild(guild);
                Ok(Reply::new(format!("Settings written to {}.", path.display())))
            }

            Intent::CopyTo { targets } => {
                let source = self.store.get_or_create(guild)?;
                let targets: Vec<GuildId> = match targets {
                    CopyTargets::All => self
                        .store
                        .guild_ids()
                        .into_iter()
                        .filter(|g| g != guild)
                        .collect(),
                    CopyTargets::Guilds(list) => {
                        list.into_iter().filter(|g| g != guild).collect()
                    }
                };
                if targets.is_empty() {
                    return Ok(Reply::new("No other guilds to copy to."));
                }
                for target in &targets {
                    self.store.mutate(target, |cfg| {
                        cfg.audio_file = source.audio_file.clone();
                        cfg.text_enabled = source.text_enabled;
                        cfg.message_template = source.message_template.clone();
                        cfg.timezone = source.timezone.clone();
                        cfg.triggers = source.triggers.clone();
                        // Channel wiring and display name stay per-guild.
                    })?;
                    self.after_mutation(target)?;
                }
                Ok(Reply::new(format!(
                    "Copied defaults and {} trigger(s) to {} guild(s).",
                    source.triggers.len(),
                    targets.len()
                )))
            }
        }
    }

    /// React to a config file change event.
    ///
    /// Echoes of the engine's own exports (within the debounce window) are
    /// dropped. File names that cannot belong to a guild are ignored; an
    /// all-digits stem is accepted even when unknown, which lets operators
    /// provision a guild by dropping a file. Problems degrade to warnings.
    pub fn handle_file_event(&self, path: &Path) {
        if self.stamps.is_echo(path, self.debounce) {
            debug!("ignoring echo of our own write: {}", path.display());
            return;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return;
        };
        let guild = GuildId::new(stem);
        let plausible_id = !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit());
        if !self.store.contains(&guild) && !plausible_id {
            debug!("ignoring config event for non-guild file {}", path.display());
            return;
        }
        let Some(content) = configfile::read_guild_file(&self.paths.config_dir, &guild) else {
            debug!("config file vanished before import: {}", path.display());
            return;
        };
        let applied = self.store.mutate(&guild, |cfg| {
            configfile::apply_guild_file(&guild, &content, cfg);
        });
        match applied {
            Ok(()) => {
                info!("guild {guild}: reloaded settings from {}", path.display());
                if let Err(error) = self.refresh_catalog(&guild) {
                    warn!("guild {guild}: catalog update failed: {error}");
                }
                self.rebuild(&guild);
            }
            Err(error) => warn!("guild {guild}: could not persist reloaded settings: {error}"),
        }
    }

    /// Remember the channel a command arrived on as the text destination,
    /// but only when none is configured yet.
    pub fn note_text_channel(
        &self,
        guild: &GuildId,
        channel: &ChannelId,
    ) -> Result<(), ChimeError> {
        let updated = self.store.mutate(guild, |cfg| {
            if cfg.text_channel.is_none() {
                cfg.text_channel = Some(channel.clone());
                true
            } else {
                false
            }
        })?;
        if updated {
            debug!("guild {guild}: learned text channel {channel}");
            self.after_mutation(guild)?;
        }
        Ok(())
    }

    /// Stop every live job. Called during daemon shutdown.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Digit-stemmed `.ini` files in the config directory with no stored
    /// guild, in sorted order. These were dropped while the daemon was down.
    fn provisioned_guilds(&self) -> Vec<GuildId> {
        let Ok(entries) = std::fs::read_dir(&self.paths.config_dir) else {
            return Vec::new();
        };
        let mut found: Vec<GuildId> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("ini"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .filter(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()))
            .map(GuildId::new)
            .filter(|guild| !self.store.contains(guild))
            .collect();
        found.sort();
        found
    }

    fn rebuild(&self, guild: &GuildId) -> usize {
        match self.store.get(guild) {
            Some(cfg) => self.scheduler.rebuild(guild, &cfg),
            None => self.scheduler.stop(guild),
        }
    }

    /// Export the guild's file, stamp the self-write and refresh the
    /// catalog. Returns the written path.
    fn export_guild_file(&self, guild: &GuildId) -> Result<PathBuf, ChimeError> {
        let cfg = self.store.get_or_create(guild)?;
        let path = configfile::export_guild(&self.paths.config_dir, guild, &cfg, self.default_tz)?;
        self.stamps.mark(&path);
        configfile::update_catalog(&self.paths.config_dir, guild, &cfg)?;
        Ok(path)
    }

    fn refresh_catalog(&self, guild: &GuildId) -> Result<(), ChimeError> {
        let cfg = self.store.get_or_create(guild)?;
        configfile::update_catalog(&self.paths.config_dir, guild, &cfg)?;
        Ok(())
    }

    /// The persist already happened inside `mutate`; finish the pipeline.
    fn after_mutation(&self, guild: &GuildId) -> Result<(), ChimeError> {
        self.export_guild_file(guild)?;
        self.rebuild(guild);
        Ok(())
    }

    fn validate_audio_file(&self, file: &str) -> Result<(), ChimeError> {
        // Asset names never traverse directories.
        let flat = !file.contains(['/', '\\']);
        if flat && self.paths.audio_dir.join(file).is_file() {
            return Ok(());
        }
        let mut available: Vec<String> = std::fs::read_dir(&self.paths.audio_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().is_file())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        available.sort();
        Err(ChimeError::AudioFileMissing {
            file: file.to_string(),
            dir: self.paths.audio_dir.clone(),
            available,
        })
    }
}

/// 1-based trigger lookup; out of range is a validation error and mutates
/// nothing.
fn trigger_at(cfg: &mut GuildConfig, index: usize) -> Result<&mut TriggerEntry, ChimeError> {
    let len = cfg.triggers.len();
    if index == 0 || index > len {
        return Err(ChimeError::TriggerIndexOutOfRange { index, len });
    }
    Ok(&mut cfg.triggers[index - 1])
}

fn render_settings(cfg: &GuildConfig, default_tz: Tz) -> String {
    let zone = cfg
        .timezone
        .clone()
        .unwrap_or_else(|| default_tz.name().to_string());

    let mut out = String::new();
    out.push_str(&format!(
        "Text notifications: {}\n",
        if cfg.text_enabled { "on" } else { "off" }
    ));
    out.push_str(&format!(
        "Text channel: {}\n",
        channel_label(cfg.text_channel.as_ref())
    ));
    out.push_str(&format!(
        "Voice channel: {}\n",
        channel_label(cfg.voice_channel.as_ref())
    ));
    out.push_str(&format!("Audio: {}\n", cfg.audio_file));
    out.push_str(&format!("Message: {}\n", cfg.message_template));
    out.push_str(&format!("Timezone: {zone}\n"));

    if cfg.triggers.is_empty() {
        out.push_str("Triggers: (none)");
        return out;
    }
    out.push_str("Triggers:");
    for (i, trigger) in cfg.triggers.iter().enumerate() {
        let shown = timespec::cron_to_hhmm(&trigger.cron).unwrap_or_else(|| trigger.cron.clone());
        let tz = trigger.timezone.as_deref().unwrap_or(&zone);
        out.push_str(&format!("\n  {}. {shown} ({tz})", i + 1));
        if let Some(audio) = &trigger.audio_file {
            out.push_str(&format!(" [audio: {audio}]"));
        }
        if trigger.message_template.is_some() {
            out.push_str(" [custom message]");
        }
        if !trigger.enabled {
            out.push_str(" [disabled]");
        }
    }
    out
}

fn channel_label(channel: Option<&ChannelId>) -> String {
    channel
        .map(|c| format!("#{c}"))
        .unwrap_or_else(|| "(not set)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_summary_lists_triggers_with_markers() {
        let cfg = GuildConfig {
            timezone: Some("Asia/Tokyo".to_string()),
            triggers: vec![
                TriggerEntry::new("0 0 9 * * *"),
                TriggerEntry {
                    cron: "0 30 18 * * Mon-Fri".to_string(),
                    timezone: Some("America/New_York".to_string()),
                    audio_file: Some("bell.mp3".to_string()),
                    message_template: Some("custom".to_string()),
                    enabled: false,
                },
            ],
            ..GuildConfig::default()
        };

        let summary = render_settings(&cfg, chrono_tz::Asia::Tokyo);
        assert!(summary.contains("Timezone: Asia/Tokyo"));
        assert!(summary.contains("1. 09:00 (Asia/Tokyo)"));
        assert!(summary.contains("2. 0 30 18 * * Mon-Fri (America/New_York)"));
        assert!(summary.contains("[audio: bell.mp3]"));
        assert!(summary.contains("[custom message]"));
        assert!(summary.contains("[disabled]"));
        assert!(summary.contains("Text channel: (not set)"));
    }

    #[test]
    fn settings_summary_for_empty_guild() {
        let summary = render_settings(&GuildConfig::default(), chrono_tz::Asia::Tokyo);
        assert!(summary.ends_with("Triggers: (none)"));
        assert!(summary.contains("Timezone: Asia/Tokyo"));
    }

    #[test]
    fn trigger_lookup_validates_bounds() {
        let mut cfg = GuildConfig {
            triggers: vec![TriggerEntry::new("0 0 9 * * *")],
            ..GuildConfig::default()
        };
        assert!(trigger_at(&mut cfg, 1).is_ok());
        assert!(matches!(
            trigger_at(&mut cfg, 0),
            Err(ChimeError::TriggerIndexOutOfRange { index: 0, len: 1 })
        ));
        assert!(matches!(
            trigger_at(&mut cfg, 2),
            Err(ChimeError::TriggerIndexOutOfRange { index: 2, len: 1 })
        ));
    }
}
