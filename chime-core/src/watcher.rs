//! Config file change detection with echo suppression.
//!
//! The engine writes the very files it watches, so every export stamps its
//! path in [`WriteStamps`]. A change event arriving within the debounce
//! window of that stamp is an echo of our own write and must not trigger a
//! re-import; only the stamp ages out, it is never removed, so a genuine
//! edit right after the window behaves normally.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::ChimeError;

/// Shared map of path to the instant of the engine's own last write.
#[derive(Debug, Clone, Default)]
pub struct WriteStamps {
    inner: Arc<Mutex<HashMap<PathBuf, Instant>>>,
}

impl WriteStamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the engine itself just wrote `path`.
    pub fn mark(&self, path: &Path) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), Instant::now());
    }

    /// Whether a change event for `path` arriving now is an echo of our own
    /// write within `window`.
    pub fn is_echo(&self, path: &Path, window: Duration) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .is_some_and(|written| written.elapsed() < window)
    }
}

/// Watches one config directory and forwards candidate change events.
///
/// Only create and data-modify events for `*.ini` files are forwarded; the
/// echo check and guild-id mapping happen in the consumer, which keeps this
/// layer free of store knowledge. Dropping the handle stops the watch.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `dir` (non-recursive), sending changed `.ini` paths
    /// into `events`. The directory must exist.
    pub fn spawn(dir: &Path, events: mpsc::UnboundedSender<PathBuf>) -> Result<Self, ChimeError> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(error) => {
                    warn!("config watch error: {error}");
                    return;
                }
            };
            // Metadata and access events are noise. Rename events matter:
            // atomic saves (vim, sed -i, mv tmp file) land as a rename onto
            // the final path, not as a data write.
            let relevant = matches!(
                event.kind,
                EventKind::Create(_)
                    | EventKind::Modify(ModifyKind::Data(_))
                    | EventKind::Modify(ModifyKind::Name(_))
                    | EventKind::Modify(ModifyKind::Any)
            );
            if !relevant {
                return;
            }
            for path in event.paths {
                if path.extension().and_then(|e| e.to_str()) == Some("ini") {
                    let _ = events.send(path);
                }
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!("watching {} for config file edits", dir.display());
        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn echo_window_expires() {
        let stamps = WriteStamps::new();
        let path = Path::new("/tmp/guild.ini");

        assert!(!stamps.is_echo(path, Duration::from_secs(1)));
        stamps.mark(path);
        assert!(stamps.is_echo(path, Duration::from_secs(60)));
        assert!(!stamps.is_echo(Path::new("/tmp/other.ini"), Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(30));
        assert!(!stamps.is_echo(path, Duration::from_millis(10)));
    }

    #[test]
    fn clones_share_one_stamp_map() {
        let stamps = WriteStamps::new();
        let clone = stamps.clone();
        clone.mark(Path::new("/tmp/a.ini"));
        assert!(stamps.is_echo(Path::new("/tmp/a.ini"), Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn forwards_ini_writes_and_ignores_others() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = ConfigWatcher::spawn(dir.path(), tx).unwrap();

        // Non-ini files never reach the channel; the ini write must.
        std::fs::write(dir.path().join("catalog.json"), "{}").unwrap();
        std::fs::write(dir.path().join("123.ini"), "[general]\n").unwrap();

        let mut saw_ini = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(path)) => {
                    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("ini"));
                    saw_ini = true;
                    break;
                }
                Ok(None) => break,
                Err(_) => {}
            }
        }
        assert!(saw_ini, "expected a change event for 123.ini");
    }

    #[tokio::test]
    async fn rename_into_the_directory_is_forwarded() {
        let tmp = TempDir::new().unwrap();
        let watched = tmp.path().join("configs");
        std::fs::create_dir_all(&watched).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = ConfigWatcher::spawn(&watched, tx).unwrap();

        // Atomic-save pattern: write a staging file outside the watched
        // directory, then rename it onto the final path.
        let staging = tmp.path().join("42.ini.tmp");
        std::fs::write(&staging, "[general]\n").unwrap();
        std::fs::rename(&staging, watched.join("42.ini")).unwrap();

        let mut saw_ini = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(path)) => {
                    if path.file_name().and_then(|n| n.to_str()) == Some("42.ini") {
                        saw_ini = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {}
            }
        }
        assert!(saw_ini, "expected an event for the renamed-in 42.ini");
    }
}
