//! Per-volume current-directory tracking.
//!
//! Windows keeps one current directory per drive, but only exposes a single
//! process-global one. This tracker owns that state explicitly: a table
//! keyed by canonical volume name, never touching the process-global
//! current directory after the initial seed. One mutex serializes the
//! table; it is held across entry validation so a concurrent reader never
//! observes a half-updated entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::FsError;
use crate::paths;
use crate::storage::Storage;

pub struct CurrentDirectory<S: Storage> {
    storage: Arc<S>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Canonical volume name → directory believed current on that volume.
    directories: HashMap<String, String>,
    /// Volume of the most recent `set_current_directory`.
    last_volume: Option<String>,
}

/// The drive letter of a `X:\`-style mount root.
fn drive_letter(mount_root: &str) -> Option<char> {
    let b = mount_root.as_bytes();
    if b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':' {
        Some(b[0].to_ascii_uppercase() as char)
    } else {
        None
    }
}

impl<S: Storage> CurrentDirectory<S> {
    /// Build a tracker seeded from the backend's process current
    /// directory, the one piece of process-global state consulted.
    pub fn new(storage: Arc<S>) -> Result<Self, FsError> {
        let tracker = CurrentDirectory {
            storage,
            inner: Mutex::new(Inner::default()),
        };
        let seed = tracker.storage.process_current_directory()?;
        tracker.set_current_directory(&seed)?;
        Ok(tracker)
    }

    /// Record `directory` as current for its volume. The input must be
    /// fully qualified; resolving a relative spelling here would hide the
    /// caller's bug.
    pub fn set_current_directory(&self, directory: &str) -> Result<(), FsError> {
        if paths::is_partially_qualified(directory) {
            return Err(FsError::InvalidArgument {
                message: format!("current directory must be fully qualified, got {directory:?}"),
            });
        }
        let (key, _) = self.volume_key(directory)?;
        let mut inner = self.inner.lock().unwrap();
        inner.directories.insert(key.clone(), directory.to_owned());
        inner.last_volume = Some(key);
        Ok(())
    }

    /// The directory current for `path`'s volume (or the last-used volume
    /// when `path` is `None`).
    ///
    /// A recorded entry is re-validated by walking up to its nearest
    /// surviving ancestor — directories can vanish between calls. With no
    /// recorded entry, the backend's hidden per-drive variable is consulted
    /// first, then the volume root; either way the discovered directory is
    /// cached before returning.
    pub fn get_current_directory(&self, path: Option<&str>) -> Result<String, FsError> {
        let resolved = match path {
            Some(p) => Some(self.volume_key(p)?),
            None => None,
        };
        let mut inner = self.inner.lock().unwrap();
        let (key, mount_root) = match resolved {
            Some((key, root)) => (key, root),
            None => {
                let key = inner.last_volume.clone().ok_or_else(|| FsError::InvalidArgument {
                    message: "no current volume has been recorded".to_owned(),
                })?;
                // The canonical name is itself a usable root path.
                (key.clone(), key)
            }
        };
        if let Some(stored) = inner.directories.get(&key).cloned() {
            let validated = self.nearest_existing_ancestor(&stored);
            if validated != stored {
                tracing::debug!(
                    "current directory {stored:?} no longer exists, falling back to {validated:?}"
                );
                inner.directories.insert(key, validated.clone());
            }
            return Ok(validated);
        }
        let discovered = drive_letter(&mount_root)
            .and_then(|drive| self.storage.hidden_drive_directory(drive))
            .unwrap_or_else(|| mount_root.clone());
        tracing::debug!("no tracked directory for {key:?}, using {discovered:?}");
        inner.directories.insert(key, discovered.clone());
        Ok(discovered)
    }

    fn volume_key(&self, path: &str) -> Result<(String, String), FsError> {
        let mount_root = self.storage.volume_mount_root(path)?;
        let key = self.storage.canonical_volume_name(&mount_root)?;
        Ok((key, mount_root))
    }

    fn nearest_existing_ancestor(&self, directory: &str) -> String {
        let mut current = directory.to_owned();
        loop {
            if self.storage.directory_exists(&current) {
                return current;
            }
            match paths::get_directory(&current) {
                Some(parent) if !parent.is_empty() && parent.len() < current.len() => {
                    current = parent.to_owned();
                }
                // Reached the root (or an unparseable remnant); hand it
                // back and let the caller's next OS call report the truth.
                _ => return current,
            }
        }
    }
}
