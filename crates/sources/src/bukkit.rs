//! dev.bukkit.org catalog, scraped from the project files listing.
//!
//! The extraction contract is narrow: the first file row is the newest,
//! its name container holds the display version, and its download button
//! carries the artifact href. Anything less shaped than that is a parse
//! error.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use semver::VersionReq;

use plugsync_core::resolver::pick_version;
use plugsync_core::{DownloadInfo, ResolvedVersion, UpdateError};

use crate::{short_name, PluginSource};

const SITE: &str = "https://dev.bukkit.org";

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)project-file-name-container.*?>([^<>]+)</a>"#).unwrap()
});
static DOWNLOAD_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)project-file-download-button.*?href="([^"]+)""#).unwrap()
});

pub struct Bukkit {
    client: Client,
}

impl Bukkit {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginSource for Bukkit {
    async fn latest_version(
        &self,
        plugin: &str,
        range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError> {
        let url = format!("{SITE}/projects/{plugin}/files");
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let (version, download) = extract_latest(&html)?;

        // Bukkit exposes one candidate per page-load; the resolver still
        // applies any requested range to it.
        let candidates = [version];
        let version = pick_version(&candidates, |v| v.as_str(), range)?.clone();

        Ok(ResolvedVersion {
            name: short_name(plugin).to_string(),
            version,
            download: DownloadInfo {
                url: download,
                sha256: None,
                sha512: None,
                size: None,
            },
        })
    }
}

fn extract_latest(html: &str) -> Result<(String, String), UpdateError> {
    let row_start = html
        .find("project-file-list-item")
        .ok_or_else(|| UpdateError::Parse("no file rows in project listing".to_string()))?;
    let row = &html[row_start..];

    let raw_version = FILE_NAME
        .captures(row)
        .map(|caps| caps[1].trim().to_string())
        .filter(|version| !version.is_empty())
        .ok_or_else(|| UpdateError::Parse("no version in file row".to_string()))?;
    let version = normalize_version(&raw_version);

    let href = DOWNLOAD_HREF
        .captures(row)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| UpdateError::Parse("no download url in file row".to_string()))?;
    let download = if href.starts_with("https:") {
        href
    } else {
        format!("{SITE}{href}")
    };

    Ok((version, download))
}

/// Reduces a display name like `Widget v1.2.3 (MC 1.20)` to a version
/// token: drop a parenthesised tail, strip leading non-digits, collapse a
/// trailing non-numeric run to `-`.
fn normalize_version(raw: &str) -> String {
    let mut value = match raw.find('(') {
        Some(idx) => raw[..idx].trim(),
        None => raw.trim(),
    };
    value = value.trim_start_matches(|c: char| !c.is_ascii_digit());

    let trailing = value
        .chars()
        .rev()
        .take_while(|c| !c.is_ascii_digit() && *c != '.')
        .count();
    if trailing == 0 {
        return value.to_string();
    }
    let mut out = value[..value.len() - trailing_bytes(value, trailing)].to_string();
    out.push('-');
    out
}

fn trailing_bytes(value: &str, chars: usize) -> usize {
    value
        .chars()
        .rev()
        .take(chars)
        .map(|c| c.len_utf8())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <table>
          <tr class="project-file-list-item">
            <td class="project-file-name">
              <div class="project-file-name-container">
                <a class="overflow-tip" href="/projects/widget/files/123">Widget v2.5.1</a>
              </div>
            </td>
            <td class="project-file-download-button">
              <a class="button tip fa-icon-download" href="/projects/widget/files/123/download"></a>
            </td>
          </tr>
          <tr class="project-file-list-item">
            <td class="project-file-name">
              <div class="project-file-name-container">
                <a class="overflow-tip" href="/projects/widget/files/122">Widget v2.5.0</a>
              </div>
            </td>
            <td class="project-file-download-button">
              <a class="button tip fa-icon-download" href="/projects/widget/files/122/download"></a>
            </td>
          </tr>
        </table>
    "#;

    #[test]
    fn first_row_is_the_newest_file() {
        let (version, download) = extract_latest(LISTING).unwrap();
        assert_eq!(version, "2.5.1");
        assert_eq!(
            download,
            "https://dev.bukkit.org/projects/widget/files/123/download"
        );
    }

    #[test]
    fn absolute_hrefs_are_kept() {
        let html = r#"
          <tr class="project-file-list-item">
            <div class="project-file-name-container"><a>v1.0</a></div>
            <td class="project-file-download-button">
              <a href="https://media.forgecdn.net/widget-1.0.jar"></a>
            </td>
          </tr>
        "#;
        let (_, download) = extract_latest(html).unwrap();
        assert_eq!(download, "https://media.forgecdn.net/widget-1.0.jar");
    }

    #[test]
    fn missing_rows_are_a_parse_error() {
        assert!(matches!(
            extract_latest("<html><body>empty</body></html>"),
            Err(UpdateError::Parse(_))
        ));
    }

    #[test]
    fn display_names_normalize_to_version_tokens() {
        assert_eq!(normalize_version("Widget v2.5.1"), "2.5.1");
        assert_eq!(normalize_version("Widget 1.4 (MC 1.20.x)"), "1.4");
        assert_eq!(normalize_version("v3.0-BETA"), "3.0-");
        assert_eq!(normalize_version("2.0.0"), "2.0.0");
    }

    #[test]
    fn range_is_applied_to_the_single_candidate() {
        let candidates = ["2.5.1".to_string()];
        let range = VersionReq::parse("^3").unwrap();
        assert!(matches!(
            pick_version(&candidates, |v| v.as_str(), Some(&range)),
            Err(UpdateError::NotFound(_))
        ));
    }
}
