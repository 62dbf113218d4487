//! Path-addressed JSON documents as a catalog of last resort.
//!
//! The identifier is a URL whose fragment names three field paths:
//! `#dwn=<path>&ver=<path>&nam=<path>`. A path starting with `/` is a
//! sequence of object-key lookups rooted at the fetched document; anything
//! else is a literal constant.

use async_trait::async_trait;
use reqwest::{Client, Url};
use semver::VersionReq;
use serde_json::Value;

use plugsync_core::{DownloadInfo, ResolvedVersion, UpdateError};

use crate::PluginSource;

#[derive(Debug, PartialEq, Eq)]
struct Locator {
    base: String,
    download: String,
    version: String,
    name: String,
}

pub struct JsonFetch {
    client: Client,
}

impl JsonFetch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginSource for JsonFetch {
    async fn latest_version(
        &self,
        plugin: &str,
        _range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError> {
        let locator = parse_locator(plugin)?;
        let document: Value = self
            .client
            .get(&locator.base)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(ResolvedVersion {
            version: resolve_path(&document, &locator.version, "ver")?,
            name: resolve_path(&document, &locator.name, "nam")?,
            download: DownloadInfo {
                url: resolve_path(&document, &locator.download, "dwn")?,
                sha256: None,
                sha512: None,
                size: None,
            },
        })
    }
}

fn parse_locator(raw: &str) -> Result<Locator, UpdateError> {
    let url = Url::parse(raw)
        .map_err(|err| UpdateError::Parse(format!("invalid source url '{raw}': {err}")))?;

    let mut download = None;
    let mut version = None;
    let mut name = None;
    for pair in url.fragment().unwrap_or("").split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "dwn" => download = Some(value.to_string()),
            "ver" => version = Some(value.to_string()),
            "nam" => name = Some(value.to_string()),
            _ => {}
        }
    }
    let (Some(download), Some(version), Some(name)) = (download, version, name) else {
        return Err(UpdateError::Parse(format!(
            "invalid source url '{raw}': missing dwn, ver or nam"
        )));
    };

    let mut base = url;
    base.set_fragment(None);
    base.set_query(None);
    Ok(Locator {
        base: base.to_string(),
        download,
        version,
        name,
    })
}

/// Resolves a field-path expression against the fetched document.
fn resolve_path(document: &Value, expr: &str, field: &str) -> Result<String, UpdateError> {
    let Some(path) = expr.strip_prefix('/') else {
        return Ok(expr.to_string());
    };
    let mut cursor = document;
    for key in path.split('/') {
        cursor = cursor.get(key).ok_or_else(|| {
            UpdateError::NotFound(format!("{field} path '{expr}' missing key '{key}'"))
        })?;
    }
    cursor
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            UpdateError::Parse(format!("{field} path '{expr}' is not a string value"))
        })
}
