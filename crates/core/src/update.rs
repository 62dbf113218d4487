//! Download/publish pipeline and the orchestration loop driving it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::ledger::{AddOutcome, InstallLedger};
use crate::{
    InstalledPlugin, Ownership, PluginRequest, ResolvedVersion, SourceRegistry, UpdateError,
};

/// A release-tag page on GitHub; rewritten to the predictable asset URL so
/// the download never has to negotiate HTML.
static RELEASE_TAG_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([^/]+/[^/]+)/releases/tag/([^/]+)$").unwrap()
});

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub plugin_dir: PathBuf,
    pub chown: Option<Ownership>,
    pub http_timeout: Duration,
}

#[derive(Debug)]
enum Outcome {
    Installed { version: String },
    UpToDate { version: String },
    Updated { previous: String, version: String },
}

/// Runs one independent pipeline per plugin request and waits for the
/// whole task set, including work enqueued while waiting, to quiesce.
pub struct UpdateEngine<R> {
    sources: Arc<R>,
    ledger: Arc<InstallLedger>,
    client: Client,
    plugin_dir: PathBuf,
    archive_dir: PathBuf,
    chown: Option<Ownership>,
    tasks: Arc<Mutex<Vec<JoinHandle<bool>>>>,
}

impl<R> Clone for UpdateEngine<R> {
    fn clone(&self) -> Self {
        Self {
            sources: Arc::clone(&self.sources),
            ledger: Arc::clone(&self.ledger),
            client: self.client.clone(),
            plugin_dir: self.plugin_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            chown: self.chown,
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<R: SourceRegistry + 'static> UpdateEngine<R> {
    pub fn new(
        sources: R,
        ledger: Arc<InstallLedger>,
        config: EngineConfig,
    ) -> Result<Self, UpdateError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        let archive_dir = archive_dir_for(&config.plugin_dir);
        Ok(Self {
            sources: Arc::new(sources),
            ledger,
            client,
            plugin_dir: config.plugin_dir,
            archive_dir,
            chown: config.chown,
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Starts one pipeline per request. Failures stay inside their own
    /// task and surface as that plugin's reported outcome.
    pub fn update(&self, requests: Vec<PluginRequest>) {
        for request in requests {
            let engine = self.clone();
            self.register(tokio::spawn(async move {
                match engine.process(&request).await {
                    Ok(Outcome::Installed { version }) => {
                        println!("+ Installed: {} ({version})", request.name);
                        true
                    }
                    Ok(Outcome::UpToDate { version }) => {
                        println!("# Up-to-date: {} ({version})", request.name);
                        true
                    }
                    Ok(Outcome::Updated { previous, version }) => {
                        println!("- Updated: {} {previous}", request.name);
                        println!("+ Updated: {} {version}", request.name);
                        true
                    }
                    Err(err) => {
                        error!(
                            "update failed for {} ({}): {err}",
                            request.name,
                            request.service.as_str()
                        );
                        eprintln!("Error: {}: {err}", request.name);
                        false
                    }
                }
            }));
        }
    }

    /// Reports every installed plugin against the newest version its source
    /// offers. Each freshness check runs as its own task.
    pub fn list(&self) {
        let engine = self.clone();
        self.register(tokio::spawn(async move {
            for plugin in engine.ledger.list().await {
                let engine_for_check = engine.clone();
                engine.register(tokio::spawn(async move {
                    let status = engine_for_check.freshness(&plugin).await;
                    println!("* {}: {} {}", plugin.name, plugin.version, status);
                    true
                }));
            }
            true
        }));
    }

    /// Drops plugins from the ledger, archiving their artifacts.
    pub fn remove(&self, requests: Vec<PluginRequest>) {
        let engine = self.clone();
        self.register(tokio::spawn(async move {
            for request in requests {
                match engine.ledger.remove(&request).await {
                    Some(removed) => {
                        println!(
                            "- Removed: {} {}",
                            removed.plugin.name, removed.plugin.version
                        );
                        if let Err(err) = engine.archive_artifact(&removed.plugin) {
                            warn!(
                                "failed to archive artifact for {}: {err}",
                                removed.plugin.name
                            );
                        }
                    }
                    None => println!("? Not installed: {}", request.name),
                }
            }
            true
        }));
    }

    /// Waits for the outstanding task set to reach a fixed point.
    ///
    /// Processing a task may register trailing work (freshness checks, the
    /// deferred ledger save), so the total unit of work is unknowable up
    /// front: drain the current handles, await them all, and loop until a
    /// round drains nothing. Only then run the coalesced ledger save.
    ///
    /// Returns the logical AND over every task outcome.
    pub async fn wait(&self) -> bool {
        let mut all_ok = true;
        loop {
            let batch: Vec<JoinHandle<bool>> = {
                let mut tasks = self.tasks.lock().expect("task registry poisoned");
                tasks.drain(..).collect()
            };
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                match handle.await {
                    Ok(ok) => all_ok &= ok,
                    Err(err) => {
                        error!("plugin task aborted: {err}");
                        all_ok = false;
                    }
                }
            }
        }

        if self.ledger.is_dirty() {
            // Reported but non-fatal; the dirty flag stays set for a retry.
            if let Err(err) = self.ledger.save().await {
                warn!("failed to save install ledger: {err}");
            }
        }
        all_ok
    }

    fn register(&self, handle: JoinHandle<bool>) {
        self.tasks
            .lock()
            .expect("task registry poisoned")
            .push(handle);
    }

    async fn process(&self, request: &PluginRequest) -> Result<Outcome, UpdateError> {
        let range = request.version_range()?;
        let resolved = self
            .sources
            .latest_version(request.service, &request.plugin, range.as_ref())
            .await?;

        if let Some(existing) = self.ledger.get(request).await {
            if existing.version == resolved.version {
                return Ok(Outcome::UpToDate {
                    version: resolved.version,
                });
            }
        }

        let (tmp, record) = self.download(request, &resolved).await?;
        self.apply_ownership(tmp.path())?;

        let destination = self
            .plugin_dir
            .join(artifact_file_name(&request.name, &resolved.version));
        // The single publish point: a pure same-volume rename.
        tmp.persist(&destination)
            .map_err(|err| UpdateError::Io(err.error))?;

        match self.ledger.add(record).await {
            AddOutcome::Installed => Ok(Outcome::Installed {
                version: resolved.version,
            }),
            AddOutcome::Unchanged => Ok(Outcome::UpToDate {
                version: resolved.version,
            }),
            AddOutcome::Replaced(previous) => {
                // Ledger already points at the new artifact; a crash before
                // this move never strands a ledger entry without its file.
                self.archive_artifact(&previous.plugin)?;
                Ok(Outcome::Updated {
                    previous: previous.plugin.version,
                    version: resolved.version,
                })
            }
        }
    }

    /// Streams the artifact into a temp file next to its destination,
    /// hashing as it goes. The temp file is removed on every early return.
    async fn download(
        &self,
        request: &PluginRequest,
        resolved: &ResolvedVersion,
    ) -> Result<(NamedTempFile, InstalledPlugin), UpdateError> {
        std::fs::create_dir_all(&self.plugin_dir)?;
        let url = direct_asset_url(&resolved.download.url, &request.name, &resolved.version);
        debug!("downloading {} from {url}", request.name);

        // Dot-prefixed so the game server ignores partial downloads.
        let mut tmp = tempfile::Builder::new()
            .prefix(".plugsync-")
            .suffix(".part")
            .tempfile_in(&self.plugin_dir)?;

        let mut response = self.client.get(&url).send().await?.error_for_status()?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            tmp.as_file_mut().write_all(&chunk)?;
            size += chunk.len() as u64;
        }
        tmp.as_file_mut().flush()?;

        let digest = format!("{:x}", hasher.finalize());
        if let Some(expected) = &resolved.download.sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(UpdateError::Integrity {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        let record = InstalledPlugin {
            name: request.name.clone(),
            service: request.service,
            plugin: request.plugin.clone(),
            version: resolved.version.clone(),
            // The source-declared URL, not the rewritten one.
            url: resolved.download.url.clone(),
            sha256: digest,
            size,
            installed: Utc::now().timestamp_millis(),
        };
        Ok((tmp, record))
    }

    async fn freshness(&self, plugin: &InstalledPlugin) -> String {
        match self
            .sources
            .latest_version(plugin.service, &plugin.plugin, None)
            .await
        {
            Ok(latest) if latest.version == plugin.version => "(latest)".to_string(),
            Ok(latest) => format!("({} at {})", latest.version, plugin.service.as_str()),
            Err(err) => format!("(error: {err})"),
        }
    }

    fn archive_artifact(&self, previous: &InstalledPlugin) -> Result<(), UpdateError> {
        let source = self
            .plugin_dir
            .join(artifact_file_name(&previous.name, &previous.version));
        std::fs::create_dir_all(&self.archive_dir)?;
        let target = self
            .archive_dir
            .join(artifact_file_name(&previous.name, &previous.version));
        std::fs::rename(&source, &target)?;
        Ok(())
    }

    fn apply_ownership(&self, path: &Path) -> Result<(), UpdateError> {
        let Some(owner) = &self.chown else {
            return Ok(());
        };
        #[cfg(unix)]
        std::os::unix::fs::chown(path, owner.uid, owner.gid)?;
        #[cfg(not(unix))]
        let _ = (path, owner);
        Ok(())
    }
}

fn artifact_file_name(name: &str, version: &str) -> String {
    format!("{name}-{version}.jar")
}

/// Superseded artifacts land in a sibling directory with the same naming
/// scheme.
fn archive_dir_for(plugin_dir: &Path) -> PathBuf {
    let mut raw = plugin_dir.as_os_str().to_os_string();
    raw.push(".old");
    PathBuf::from(raw)
}

fn direct_asset_url(url: &str, name: &str, version: &str) -> String {
    match RELEASE_TAG_URL.captures(url) {
        Some(caps) => format!(
            "https://github.com/{}/releases/download/{}/{name}-{version}.jar",
            &caps[1], &caps[2]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_tag_url_is_rewritten_to_direct_asset() {
        let rewritten = direct_asset_url(
            "https://github.com/acme/widget/releases/tag/v1.2.0",
            "Widget",
            "1.2.0",
        );
        assert_eq!(
            rewritten,
            "https://github.com/acme/widget/releases/download/v1.2.0/Widget-1.2.0.jar"
        );
    }

    #[test]
    fn other_urls_pass_through_verbatim() {
        for url in [
            "https://github.com/acme/widget/releases/download/v1/Widget.jar",
            "https://cdn.modrinth.com/data/abc/versions/def/widget.jar",
            "https://github.com/acme/widget/releases/tag/v1/extra",
        ] {
            assert_eq!(direct_asset_url(url, "Widget", "1.0.0"), url);
        }
    }

    #[test]
    fn archive_dir_is_a_sibling_with_old_suffix() {
        assert_eq!(
            archive_dir_for(Path::new("srv/plugins")),
            PathBuf::from("srv/plugins.old")
        );
    }

    #[test]
    fn artifact_names_combine_name_and_version() {
        assert_eq!(artifact_file_name("Essentials", "2.20.1"), "Essentials-2.20.1.jar");
    }
}
