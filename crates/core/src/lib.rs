use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

mod error;
pub mod ledger;
pub mod resolver;
pub mod update;

pub use error::UpdateError;
pub use ledger::{AddOutcome, InstallLedger};
pub use update::{EngineConfig, UpdateEngine};

/// Remote catalog a plugin is sourced from.
///
/// The set is closed: adding a catalog means adding a variant here and a
/// matching arm in the source registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Service {
    Hangar,
    Modrinth,
    Bukkit,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "jar")]
    Jar,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hangar => "Hangar",
            Self::Modrinth => "Modrinth",
            Self::Bukkit => "Bukkit",
            Self::Json => "json",
            Self::Jar => "jar",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UpdateError> {
        match value {
            "Hangar" => Ok(Self::Hangar),
            "Modrinth" => Ok(Self::Modrinth),
            "Bukkit" => Ok(Self::Bukkit),
            "json" => Ok(Self::Json),
            "jar" => Ok(Self::Jar),
            other => Err(UpdateError::UnknownService(other.to_string())),
        }
    }
}

/// One plugin the user asked us to keep current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Local identifier; unique key in the install ledger.
    pub name: String,
    pub service: Service,
    /// Source-specific identifier (project slug, `owner/project`, or a URL).
    pub plugin: String,
    /// Optional exact pin or semver range expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PluginRequest {
    /// Parsed form of the `version` constraint.
    ///
    /// A bare version string pins exactly; anything else is handed to the
    /// semver range parser as written.
    pub fn version_range(&self) -> Result<Option<VersionReq>, UpdateError> {
        let Some(raw) = self.version.as_deref() else {
            return Ok(None);
        };
        let raw = raw.trim();
        let expr = if Version::parse(raw).is_ok() {
            format!("={raw}")
        } else {
            raw.to_string()
        };
        VersionReq::parse(&expr)
            .map(Some)
            .map_err(|err| UpdateError::Parse(format!("invalid version range '{raw}': {err}")))
    }
}

/// Where and how to fetch one resolved artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The newest version of a plugin a source is willing to hand out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVersion {
    pub name: String,
    /// Source-defined version string; not necessarily strict semver.
    pub version: String,
    pub download: DownloadInfo,
}

/// A plugin currently present in the live plugin directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPlugin {
    pub name: String,
    pub service: Service,
    pub plugin: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub size: u64,
    /// Install time, epoch milliseconds.
    pub installed: i64,
}

/// A previously installed plugin, retired into the replacement history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedPlugin {
    #[serde(flatten)]
    pub plugin: InstalledPlugin,
    /// Removal time, epoch milliseconds.
    pub removed: i64,
}

/// Ownership applied to freshly downloaded artifacts before publish.
#[derive(Debug, Clone, Copy)]
pub struct Ownership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Dispatches a service tag to the catalog that can resolve it.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    async fn latest_version(
        &self,
        service: Service,
        plugin: &str,
        range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_round_trips_through_parse() {
        for service in [
            Service::Hangar,
            Service::Modrinth,
            Service::Bukkit,
            Service::Json,
            Service::Jar,
        ] {
            assert_eq!(Service::parse(service.as_str()).unwrap(), service);
        }
    }

    #[test]
    fn service_rejects_unknown_tag() {
        assert!(matches!(
            Service::parse("Spigot"),
            Err(UpdateError::UnknownService(tag)) if tag == "Spigot"
        ));
    }

    #[test]
    fn service_serializes_with_ledger_spelling() {
        assert_eq!(serde_json::to_string(&Service::Jar).unwrap(), "\"jar\"");
        assert_eq!(
            serde_json::to_string(&Service::Hangar).unwrap(),
            "\"Hangar\""
        );
    }

    #[test]
    fn version_range_absent_when_unpinned() {
        let request = request("essentials", None);
        assert!(request.version_range().unwrap().is_none());
    }

    #[test]
    fn bare_version_pins_exactly() {
        let request = request("essentials", Some("1.2.3"));
        let range = request.version_range().unwrap().unwrap();
        assert!(range.matches(&Version::parse("1.2.3").unwrap()));
        assert!(!range.matches(&Version::parse("1.2.4").unwrap()));
    }

    #[test]
    fn caret_range_parses_as_written() {
        let request = request("essentials", Some("^1"));
        let range = request.version_range().unwrap().unwrap();
        assert!(range.matches(&Version::parse("1.9.0").unwrap()));
        assert!(!range.matches(&Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn malformed_range_is_a_parse_error() {
        let request = request("essentials", Some("not a range"));
        assert!(matches!(
            request.version_range(),
            Err(UpdateError::Parse(_))
        ));
    }

    fn request(name: &str, version: Option<&str>) -> PluginRequest {
        PluginRequest {
            name: name.to_string(),
            service: Service::Bukkit,
            plugin: name.to_string(),
            version: version.map(str::to_string),
        }
    }
}
