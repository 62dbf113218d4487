//! Modrinth catalog (`api.modrinth.com`).

use async_trait::async_trait;
use reqwest::Client;
use semver::VersionReq;
use serde::Deserialize;

use plugsync_core::resolver::{pick_version, select_artifact};
use plugsync_core::{DownloadInfo, ResolvedVersion, UpdateError};

use crate::{short_name, PluginSource};

const API_BASE: &str = "https://api.modrinth.com/v2";

#[derive(Debug, Deserialize)]
struct VersionItem {
    version_number: String,
    #[serde(default)]
    files: Vec<VersionFile>,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
    size: u64,
    hashes: FileHashes,
}

#[derive(Debug, Deserialize)]
struct FileHashes {
    #[serde(default)]
    sha512: Option<String>,
}

pub struct Modrinth {
    client: Client,
}

impl Modrinth {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginSource for Modrinth {
    async fn latest_version(
        &self,
        plugin: &str,
        range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError> {
        let slug = short_name(plugin);
        let url = format!("{API_BASE}/project/{slug}/version");
        let versions: Vec<VersionItem> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resolve(versions, slug, range)
    }
}

fn resolve(
    versions: Vec<VersionItem>,
    slug: &str,
    range: Option<&VersionReq>,
) -> Result<ResolvedVersion, UpdateError> {
    let item = pick_version(&versions, |item| item.version_number.as_str(), range)?;
    let jars: Vec<&VersionFile> = item
        .files
        .iter()
        .filter(|file| file.filename.ends_with(".jar"))
        .collect();
    if jars.is_empty() {
        return Err(UpdateError::NotFound(format!(
            "no jar artifact for version {}",
            item.version_number
        )));
    }
    let file = select_artifact(&jars, |file| file.filename.as_str(), |file| file.primary);

    Ok(ResolvedVersion {
        name: slug.to_string(),
        version: item.version_number.clone(),
        download: DownloadInfo {
            url: file.url.clone(),
            sha256: None,
            sha512: file.hashes.sha512.clone(),
            size: Some(file.size),
        },
    })
}
