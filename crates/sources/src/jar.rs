//! Direct artifact URLs with no catalog behind them.
//!
//! The only version signal a bare URL offers is its `last-modified`
//! timestamp, rendered as a compact UTC token so successive fetches of the
//! same origin file order by freshness.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{LAST_MODIFIED, LOCATION};
use reqwest::{Client, Url};
use semver::VersionReq;
use tracing::debug;

use plugsync_core::{DownloadInfo, ResolvedVersion, UpdateError};

use crate::{short_name, PluginSource};

const MAX_REDIRECTS: usize = 10;

pub struct JarFetch {
    // Redirects are followed by hand so intermediate hops stay visible.
    client: Client,
}

impl JarFetch {
    pub fn new(http_timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PluginSource for JarFetch {
    async fn latest_version(
        &self,
        plugin: &str,
        _range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError> {
        let mut url = Url::parse(plugin.trim())
            .map_err(|err| UpdateError::Parse(format!("invalid jar url '{plugin}': {err}")))?;

        let mut hops = 0;
        let response = loop {
            let response = self.client.head(url.clone()).send().await?;
            if !response.status().is_redirection() {
                break response.error_for_status()?;
            }
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(UpdateError::Parse(format!(
                    "redirect loop fetching {plugin}"
                )));
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    UpdateError::Parse("redirect without location header".to_string())
                })?;
            url = url.join(location).map_err(|err| {
                UpdateError::Parse(format!("invalid redirect location '{location}': {err}"))
            })?;
            debug!("following redirect to {url}");
        };

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                UpdateError::Parse(
                    "direct jar source requires a last-modified header".to_string(),
                )
            })?;
        let modified = DateTime::parse_from_rfc2822(last_modified).map_err(|err| {
            UpdateError::Parse(format!("invalid last-modified '{last_modified}': {err}"))
        })?;

        let name = short_name(plugin);
        let name = name.strip_suffix(".jar").unwrap_or(name);
        Ok(ResolvedVersion {
            name: name.to_string(),
            version: version_token(modified.with_timezone(&Utc)),
            download: DownloadInfo {
                url: response.url().to_string(),
                sha256: None,
                sha512: None,
                size: None,
            },
        })
    }
}

/// Compact UTC timestamp, seconds precision, no separators.
fn version_token(modified: DateTime<Utc>) -> String {
    modified.format("%Y%m%dT%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_token_is_compact_utc() {
        let modified = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(version_token(modified), "20151021T072800");
    }

    #[test]
    fn version_tokens_order_by_freshness() {
        let older = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let newer = DateTime::parse_from_rfc2822("Thu, 22 Oct 2015 06:00:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        assert!(version_token(older) < version_token(newer));
    }

    #[test]
    fn timezone_offsets_normalize_to_utc() {
        let modified = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 09:28:00 +0200")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(version_token(modified), "20151021T072800");
    }
}
