//! PaperMC Hangar catalog (`hangar.papermc.io`).

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use semver::VersionReq;
use serde::Deserialize;

use plugsync_core::resolver::pick_version;
use plugsync_core::{DownloadInfo, ResolvedVersion, UpdateError};

use crate::{short_name, PluginSource};

const API_BASE: &str = "https://hangar.papermc.io/api/v1";
const PLATFORM: &str = "PAPER";

#[derive(Debug, Deserialize)]
struct VersionsResponse {
    result: Vec<VersionItem>,
}

#[derive(Debug, Deserialize)]
struct VersionItem {
    /// The version string.
    name: String,
    #[serde(default)]
    downloads: HashMap<String, PlatformDownload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformDownload {
    #[serde(default)]
    file_info: Option<FileInfo>,
    #[serde(default)]
    external_url: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    size_bytes: u64,
    sha256_hash: String,
}

pub struct Hangar {
    client: Client,
}

impl Hangar {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginSource for Hangar {
    async fn latest_version(
        &self,
        plugin: &str,
        range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError> {
        let project = short_name(plugin);
        let url = format!("{API_BASE}/projects/{project}/versions");
        let payload: VersionsResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resolve(payload, project, range)
    }
}

fn resolve(
    payload: VersionsResponse,
    project: &str,
    range: Option<&VersionReq>,
) -> Result<ResolvedVersion, UpdateError> {
    let item = pick_version(&payload.result, |item| item.name.as_str(), range)?;
    let paper = item.downloads.get(PLATFORM).ok_or_else(|| {
        UpdateError::NotFound(format!("no {PLATFORM} download for version {}", item.name))
    })?;
    let url = paper
        .download_url
        .clone()
        .or_else(|| paper.external_url.clone())
        .ok_or_else(|| {
            UpdateError::NotFound(format!("no download url for version {}", item.name))
        })?;

    Ok(ResolvedVersion {
        name: project.to_string(),
        version: item.name.clone(),
        download: DownloadInfo {
            url,
            sha256: paper
                .file_info
                .as_ref()
                .map(|info| info.sha256_hash.clone()),
            sha512: None,
            size: paper.file_info.as_ref().map(|info| info.size_bytes),
        },
    })
}
