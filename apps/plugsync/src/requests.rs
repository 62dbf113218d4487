//! User-facing plugin shorthand and the persisted request list.
//!
//! Accepted spellings: full catalog URLs, `service:` prefixed identifiers
//! (`hangar:owner/project`, `bukkit:id`, `modrinth:slug`, `jar:https://…`,
//! `json:https://…#dwn=…&ver=…&nam=…`), bare `owner/project` for Hangar,
//! and bare `id` for Bukkit. Non-URL forms accept a trailing
//! `@<version-or-range>` pin. Bukkit and Modrinth identifiers are folded to
//! lowercase; Hangar identifiers keep their case.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tempfile::NamedTempFile;

use plugsync_core::{PluginRequest, Service};

pub fn parse_request(raw: &str) -> Result<PluginRequest> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("empty plugin spec");
    }

    if let Some(rest) = raw.strip_prefix("https://hangar.papermc.io/") {
        let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
        let owner = segments.next();
        let project = segments.next();
        let (Some(owner), Some(project)) = (owner, project) else {
            bail!("hangar url must name an owner and a project: {raw}");
        };
        return build(Service::Hangar, &format!("{owner}/{project}"), None);
    }
    if let Some(rest) = raw.strip_prefix("https://dev.bukkit.org/projects/") {
        let id = rest.split('/').next().unwrap_or_default();
        if !is_plain_ident(id) {
            bail!("bukkit url must name a project: {raw}");
        }
        return build(Service::Bukkit, id, None);
    }
    if let Some(rest) = raw.strip_prefix("https://modrinth.com/plugin/") {
        let slug = rest.split('/').next().unwrap_or_default();
        if !is_plain_ident(slug) {
            bail!("modrinth url must name a project: {raw}");
        }
        return build(Service::Modrinth, slug, None);
    }
    if let Some(url) = raw.strip_prefix("jar:") {
        return build_from_url(Service::Jar, url);
    }
    if let Some(url) = raw.strip_prefix("json:") {
        return build_from_url(Service::Json, url);
    }

    let (id, version) = match raw.split_once('@') {
        Some((_, version)) if version.trim().is_empty() => {
            bail!("empty version pin in '{raw}'")
        }
        Some((id, version)) => (id, Some(version.trim().to_string())),
        None => (raw, None),
    };

    if let Some(id) = id.strip_prefix("hangar:") {
        if !is_scoped_ident(id) {
            bail!("hangar plugins are addressed as owner/project: {raw}");
        }
        return build(Service::Hangar, id, version);
    }
    if let Some(id) = id.strip_prefix("bukkit:") {
        if !is_plain_ident(id) {
            bail!("invalid bukkit project id: {raw}");
        }
        return build(Service::Bukkit, id, version);
    }
    if let Some(id) = id.strip_prefix("modrinth:") {
        if !is_plain_ident(id) {
            bail!("invalid modrinth project slug: {raw}");
        }
        return build(Service::Modrinth, id, version);
    }
    if is_scoped_ident(id) {
        return build(Service::Hangar, id, version);
    }
    if is_plain_ident(id) {
        return build(Service::Bukkit, id, version);
    }
    bail!("unknown plugin format: {raw}")
}

pub fn parse_requests(raw: &[String]) -> Result<Vec<PluginRequest>> {
    raw.iter().map(|spec| parse_request(spec)).collect()
}

fn build(service: Service, id: &str, version: Option<String>) -> Result<PluginRequest> {
    let name = id.rsplit('/').next().unwrap_or(id).to_string();
    let plugin = match service {
        Service::Bukkit | Service::Modrinth => id.to_ascii_lowercase(),
        _ => id.to_string(),
    };
    Ok(PluginRequest {
        name,
        service,
        plugin,
        version,
    })
}

fn build_from_url(service: Service, url: &str) -> Result<PluginRequest> {
    if !url.starts_with("https://") && !url.starts_with("http://") {
        bail!("{} plugins are addressed by url: {url}", service.as_str());
    }
    let path = url
        .split(['#', '?'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let segment = path.rsplit('/').next().unwrap_or_default();
    let name = segment
        .strip_suffix(".jar")
        .or_else(|| segment.strip_suffix(".json"))
        .unwrap_or(segment);
    if name.is_empty() {
        bail!("cannot derive a plugin name from url: {url}");
    }
    Ok(PluginRequest {
        name: name.to_string(),
        service,
        plugin: url.to_string(),
        version: None,
    })
}

fn is_plain_ident(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_scoped_ident(value: &str) -> bool {
    match value.split_once('/') {
        Some((owner, project)) => is_plain_ident(owner) && is_plain_ident(project),
        None => false,
    }
}

/// Loads the persisted request list; an absent file is an empty list.
pub fn load_request_list(path: &Path) -> Result<Vec<PluginRequest>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse request list {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to read request list {}", path.display())),
    }
}

/// Replaces or appends the given requests by name, then rewrites the list
/// atomically.
pub fn merge_request_list(path: &Path, updates: &[PluginRequest]) -> Result<()> {
    let mut list = load_request_list(path)?;
    for request in updates {
        match list.iter_mut().find(|entry| entry.name == request.name) {
            Some(entry) => *entry = request.clone(),
            None => list.push(request.clone()),
        }
    }

    let json = serde_json::to_vec_pretty(&list).context("failed to encode request list")?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage request list near {}", path.display()))?;
    tmp.write_all(&json)?;
    tmp.persist(path)
        .map_err(|err| anyhow!(err.error))
        .with_context(|| format!("failed to write request list {}", path.display()))?;
    Ok(())
}
