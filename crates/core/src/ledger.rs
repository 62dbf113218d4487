//! Persistent record of installed plugins and their replacement history.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::{InstalledPlugin, PluginRequest, RemovedPlugin, UpdateError};

/// Result of [`InstallLedger::add`].
#[derive(Debug)]
pub enum AddOutcome {
    /// No entry existed for this name; a fresh install.
    Installed,
    /// An entry already holds this exact version; nothing changed.
    Unchanged,
    /// The previous entry was archived into the history and replaced.
    Replaced(RemovedPlugin),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    current: Vec<InstalledPlugin>,
    #[serde(default)]
    history: BTreeMap<String, Vec<RemovedPlugin>>,
}

/// Single in-memory authority over the install record.
///
/// Loaded once per run; an absent backing file is an empty ledger, a
/// malformed one is fatal. Mutations mark the ledger dirty; [`save`]
/// persists at most once per run unless re-dirtied.
///
/// [`save`]: InstallLedger::save
pub struct InstallLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
    dirty: AtomicBool,
    // Serializes concurrent save() calls behind one in-flight write.
    save_lock: Mutex<()>,
}

impl InstallLedger {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, UpdateError> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice::<LedgerState>(&raw).map_err(|err| {
                UpdateError::Parse(format!("malformed ledger {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => LedgerState::default(),
            Err(err) => return Err(UpdateError::Io(err)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
            dirty: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        })
    }

    /// Snapshot of the current set.
    pub async fn list(&self) -> Vec<InstalledPlugin> {
        self.state.lock().await.current.clone()
    }

    pub async fn get(&self, request: &PluginRequest) -> Option<InstalledPlugin> {
        self.state
            .lock()
            .await
            .current
            .iter()
            .find(|plugin| plugin.name == request.name)
            .cloned()
    }

    /// Records an install, replacing and archiving any previous version.
    ///
    /// The decision runs under one lock acquisition with no await point, so
    /// two concurrent installs of the same name cannot both observe "no
    /// existing entry".
    pub async fn add(&self, plugin: InstalledPlugin) -> AddOutcome {
        let mut state = self.state.lock().await;
        match state
            .current
            .iter()
            .position(|existing| existing.name == plugin.name)
        {
            None => {
                state.current.push(plugin);
                self.mark_dirty();
                AddOutcome::Installed
            }
            Some(idx) => {
                if state.current[idx].version == plugin.version {
                    return AddOutcome::Unchanged;
                }
                let removed = RemovedPlugin {
                    plugin: state.current[idx].clone(),
                    removed: plugin.installed,
                };
                state.current[idx] = plugin;
                state
                    .history
                    .entry(removed.plugin.name.clone())
                    .or_default()
                    .insert(0, removed.clone());
                self.mark_dirty();
                AddOutcome::Replaced(removed)
            }
        }
    }

    /// Removes an entry by name or, failing that, by source identifier
    /// narrowed to the request's service. Returns the archived record.
    pub async fn remove(&self, request: &PluginRequest) -> Option<RemovedPlugin> {
        let mut state = self.state.lock().await;
        let idx = state
            .current
            .iter()
            .position(|plugin| plugin.name == request.name)
            .or_else(|| {
                state.current.iter().position(|plugin| {
                    plugin.plugin == request.plugin && plugin.service == request.service
                })
            })?;
        let removed = RemovedPlugin {
            plugin: state.current.remove(idx),
            removed: Utc::now().timestamp_millis(),
        };
        state
            .history
            .entry(removed.plugin.name.clone())
            .or_default()
            .insert(0, removed.clone());
        self.mark_dirty();
        Some(removed)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Persists the ledger iff dirty.
    ///
    /// A caller arriving while a save is in flight waits for it, then
    /// re-evaluates dirtiness instead of issuing a redundant write. The
    /// dirty flag clears only after the write lands.
    pub async fn save(&self) -> Result<(), UpdateError> {
        let _in_flight = self.save_lock.lock().await;
        if !self.is_dirty() {
            return Ok(());
        }

        let json = {
            let state = self.state.lock().await;
            serde_json::to_vec_pretty(&*state)
                .map_err(|err| UpdateError::Parse(format!("failed to encode ledger: {err}")))?
        };

        let dir = parent_or_current(&self.path);
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path)
            .map_err(|err| UpdateError::Io(err.error))?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn parent_or_current(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
