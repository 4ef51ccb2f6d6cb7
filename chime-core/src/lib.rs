//! Per-guild chime scheduling and configuration synchronization.
//!
//! `chime-core` keeps three representations of a guild's chime schedule in
//! agreement: the durable JSON store, the live set of cron-timed jobs, and
//! one human-editable INI file per guild. Mutations flow through a single
//! pipeline (persist, export, rebuild) whether they originate from a
//! structured [`intents::Intent`] or from an external edit to the config
//! file, with [`watcher::WriteStamps`] suppressing echoes of the engine's
//! own writes.
//!
//! The chat platform lives behind the [`transport::ChatTransport`] trait;
//! the engine carries no credentials and no gateway code.

#![forbid(unsafe_code)]

pub mod configfile;
pub mod errors;
pub mod executor;
pub mod inifile;
pub mod intents;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod template;
pub mod timespec;
pub mod transport;
pub mod types;
pub mod watcher;

pub use errors::{ChimeError, StoreError, TransportError};
pub use executor::{ChimeAction, TriggerExecutor};
pub use intents::{CopyTargets, Intent, Reply};
pub use scheduler::{ChimeScheduler, JobSpec};
pub use service::{ChimeService, ServicePaths};
pub use store::GuildStore;
pub use transport::{ChatTransport, MockTransport, TransportCall};
pub use types::{ChannelId, GuildConfig, GuildId, TriggerEntry};
pub use watcher::{ConfigWatcher, WriteStamps};
