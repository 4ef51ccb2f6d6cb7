//! Durable guild configuration store.
//!
//! Whole-document JSON persistence: every mutation rewrites the full guild
//! map through a temp file + rename. Scale is tens of guilds with rare
//! writes, so the single document keeps recovery trivial and the file
//! diffable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::types::{GuildConfig, GuildId};

#[derive(Deserialize)]
struct StoreDocument {
    #[serde(default)]
    guilds: BTreeMap<GuildId, GuildConfig>,
}

/// Thread-safe guild map with synchronous persistence.
///
/// Every mutation routes through [`GuildStore::mutate`], which persists the
/// document before returning, so an applied update is never lost to a
/// crash. Reads hand out clones; nothing outside the store holds a live
/// reference into the map.
pub struct GuildStore {
    path: PathBuf,
    guilds: RwLock<BTreeMap<GuildId, GuildConfig>>,
}

impl GuildStore {
    /// Load the store document, creating an empty one when the file does
    /// not exist. A present-but-unreadable document is a hard error:
    /// silently starting empty would orphan the operator's data.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            let raw = fs::read_to_string(path)?;
            let doc: StoreDocument = serde_json::from_str(&raw)?;
            debug!("loaded {} guild(s) from {}", doc.guilds.len(), path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                guilds: RwLock::new(doc.guilds),
            });
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let store = Self {
            path: path.to_path_buf(),
            guilds: RwLock::new(BTreeMap::new()),
        };
        {
            let guilds = store.guilds.read().unwrap_or_else(|e| e.into_inner());
            store.persist(&guilds)?;
        }
        info!("created new guild store at {}", path.display());
        Ok(store)
    }

    /// Apply `f` to the config for `id`, creating a default record first if
    /// none exists, and persist the whole document before returning the
    /// closure's value.
    pub fn mutate<T>(
        &self,
        id: &GuildId,
        f: impl FnOnce(&mut GuildConfig) -> T,
    ) -> Result<T, StoreError> {
        let mut guilds = self.guilds.write().unwrap_or_else(|e| e.into_inner());
        if !guilds.contains_key(id) {
            debug!("creating config for guild {id} with defaults");
        }
        let cfg = guilds.entry(id.clone()).or_default();
        let value = f(cfg);
        self.persist(&guilds)?;
        Ok(value)
    }

    /// Existing config for `id`, or a freshly persisted default record.
    pub fn get_or_create(&self, id: &GuildId) -> Result<GuildConfig, StoreError> {
        {
            let guilds = self.guilds.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cfg) = guilds.get(id) {
                return Ok(cfg.clone());
            }
        }
        self.mutate(id, |cfg| cfg.clone())
    }

    /// Config for `id`, if one is stored.
    pub fn get(&self, id: &GuildId) -> Option<GuildConfig> {
        self.guilds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &GuildId) -> bool {
        self.guilds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// All stored guild ids, in sorted order.
    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Point-in-time clone of the whole map.
    pub fn snapshot(&self) -> BTreeMap<GuildId, GuildConfig> {
        self.guilds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.guilds.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, guilds: &BTreeMap<GuildId, GuildConfig>) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct Doc<'a> {
            guilds: &'a BTreeMap<GuildId, GuildConfig>,
        }

        let raw = serde_json::to_string_pretty(&Doc { guilds })?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, raw)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
