use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use plugsync_core::Ownership;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub plugin_dir: Option<String>,
    pub ledger_path: Option<String>,
    pub requests_path: Option<String>,
    pub http_timeout_seconds: Option<u64>,
    pub chown: Option<ChownConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChownConfig {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl AppConfig {
    /// Loads the config file; an absent file means all defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file {}", path.display()))
            }
        };
        let cfg = toml::from_str::<Self>(&raw).context("failed to parse TOML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.plugin_dir {
            if dir.trim().is_empty() {
                return Err(anyhow!("plugin_dir must not be empty when set"));
            }
        }
        if let Some(path) = &self.ledger_path {
            if path.trim().is_empty() {
                return Err(anyhow!("ledger_path must not be empty when set"));
            }
        }
        if let Some(path) = &self.requests_path {
            if path.trim().is_empty() {
                return Err(anyhow!("requests_path must not be empty when set"));
            }
        }
        if let Some(timeout) = self.http_timeout_seconds {
            if timeout == 0 {
                return Err(anyhow!("http_timeout_seconds must be > 0 when set"));
            }
        }
        Ok(())
    }

    pub fn plugin_dir(&self) -> &str {
        self.plugin_dir.as_deref().unwrap_or("plugins")
    }

    pub fn ledger_path(&self) -> &str {
        self.ledger_path.as_deref().unwrap_or("installed-plugins.json")
    }

    pub fn requests_path(&self) -> &str {
        self.requests_path.as_deref().unwrap_or("plugins.json")
    }

    pub fn http_timeout_seconds(&self) -> u64 {
        self.http_timeout_seconds.unwrap_or(30)
    }

    pub fn ownership(&self) -> Option<Ownership> {
        self.chown.as_ref().map(|chown| Ownership {
            uid: chown.uid,
            gid: chown.gid,
        })
    }
}
