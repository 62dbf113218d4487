//! Concrete plugin catalogs and the registry that dispatches to them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use semver::VersionReq;

use plugsync_core::{ResolvedVersion, Service, SourceRegistry, UpdateError};

pub mod bukkit;
pub mod hangar;
pub mod jar;
pub mod json;
pub mod modrinth;

pub use bukkit::Bukkit;
pub use hangar::Hangar;
pub use jar::JarFetch;
pub use json::JsonFetch;
pub use modrinth::Modrinth;

/// One remote catalog capable of resolving a plugin identifier to its
/// newest matching version.
#[async_trait]
pub trait PluginSource: Send + Sync {
    async fn latest_version(
        &self,
        plugin: &str,
        range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError>;
}

/// Strategy table over the closed [`Service`] enum: one catalog per
/// variant. Adding a catalog means one module, one field, one match arm.
pub struct CatalogRegistry {
    hangar: Hangar,
    modrinth: Modrinth,
    bukkit: Bukkit,
    json: JsonFetch,
    jar: JarFetch,
}

impl CatalogRegistry {
    pub fn new(http_timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder().timeout(http_timeout).build()?;
        Ok(Self {
            hangar: Hangar::new(client.clone()),
            modrinth: Modrinth::new(client.clone()),
            bukkit: Bukkit::new(client.clone()),
            json: JsonFetch::new(client),
            jar: JarFetch::new(http_timeout)?,
        })
    }

    fn source(&self, service: Service) -> &dyn PluginSource {
        match service {
            Service::Hangar => &self.hangar,
            Service::Modrinth => &self.modrinth,
            Service::Bukkit => &self.bukkit,
            Service::Json => &self.json,
            Service::Jar => &self.jar,
        }
    }
}

#[async_trait]
impl SourceRegistry for CatalogRegistry {
    async fn latest_version(
        &self,
        service: Service,
        plugin: &str,
        range: Option<&VersionReq>,
    ) -> Result<ResolvedVersion, UpdateError> {
        self.source(service).latest_version(plugin, range).await
    }
}

/// Last path segment of a source identifier; catalogs accept both bare
/// slugs and `owner/project` forms.
pub(crate) fn short_name(identifier: &str) -> &str {
    identifier
        .rsplit('/')
        .next()
        .unwrap_or(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(short_name("EssentialsX/Essentials"), "Essentials");
        assert_eq!(short_name("worldedit"), "worldedit");
        assert_eq!(short_name("a/b/c"), "c");
    }
}
