//! Site manifest loading.
//!
//! A manifest is YAML, JSON, or TOML (picked by extension) with a
//! `sites` list, an optional `vlan_sets` map, and optional
//! `site_defaults` applied beneath every template. Cells are flattened to
//! strings so the core loader sees the same rows a spreadsheet export
//! would produce. A site may point `vlans_file` at a separate VLAN list,
//! resolved against the manifest's directory.
//!
//! `ztbctl pull` writes back into a manifest through [`upsert_reference`],
//! keeping the file's format.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use ztbctl_core::{RawRow, ReferenceSite};

use crate::error::CliError;

#[derive(Debug, Default)]
pub struct Manifest {
    pub sites: Vec<RawRow>,
    pub vlan_sets: BTreeMap<String, Vec<RawRow>>,
    pub site_defaults: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

fn manifest_err(path: &Path, reason: impl std::fmt::Display) -> CliError {
    CliError::Manifest {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn parse_document(path: &Path) -> Result<Value, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| manifest_err(path, e))?;
    match Format::for_path(path) {
        Format::Json => serde_json::from_str(&text).map_err(|e| manifest_err(path, e)),
        Format::Yaml => serde_yaml::from_str(&text).map_err(|e| manifest_err(path, e)),
        Format::Toml => {
            let value: toml::Value = toml::from_str(&text).map_err(|e| manifest_err(path, e))?;
            serde_json::to_value(value).map_err(|e| manifest_err(path, e))
        }
    }
}

// ── Cell flattening ──────────────────────────────────────────────────

fn cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(cell)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

fn to_row(path: &Path, what: &str, value: &Value) -> Result<RawRow, CliError> {
    let Value::Object(map) = value else {
        return Err(manifest_err(path, format!("{what} must be a map")));
    };
    Ok(map
        .iter()
        .filter_map(|(k, v)| cell(v).map(|c| (k.clone(), c)))
        .collect())
}

fn to_rows(path: &Path, what: &str, value: &Value) -> Result<Vec<RawRow>, CliError> {
    let Value::Array(items) = value else {
        return Err(manifest_err(path, format!("{what} must be a list")));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| to_row(path, &format!("{what}[{i}]"), item))
        .collect()
}

// ── Loading ──────────────────────────────────────────────────────────

/// Read a manifest and any VLAN files its sites reference.
pub fn read(path: &Path) -> Result<Manifest, CliError> {
    let doc = parse_document(path)?;
    let Value::Object(root) = doc else {
        return Err(manifest_err(path, "top level must be a map"));
    };

    let sites = match root.get("sites") {
        Some(value) => to_rows(path, "sites", value)?,
        None => return Err(manifest_err(path, "missing `sites` list")),
    };

    let mut vlan_sets = BTreeMap::new();
    if let Some(value) = root.get("vlan_sets") {
        let Value::Object(sets) = value else {
            return Err(manifest_err(path, "vlan_sets must be a map"));
        };
        for (name, rows) in sets {
            vlan_sets.insert(name.clone(), to_rows(path, &format!("vlan_sets.{name}"), rows)?);
        }
    }

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for site in &sites {
        let Some(file) = site.get("vlans_file").map(|f| f.trim()) else {
            continue;
        };
        if file.is_empty() || vlan_sets.contains_key(file) {
            continue;
        }
        let rows = read_vlans_file(&base.join(file))?;
        vlan_sets.insert(file.to_owned(), rows);
    }

    let site_defaults = match root.get("site_defaults") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(manifest_err(path, "site_defaults must be a map")),
        None => Map::new(),
    };

    tracing::debug!(
        path = %path.display(),
        sites = sites.len(),
        vlan_sets = vlan_sets.len(),
        "read manifest"
    );
    Ok(Manifest {
        sites,
        vlan_sets,
        site_defaults,
    })
}

// ── Writing ──────────────────────────────────────────────────────────

fn write_document(path: &Path, doc: &Value) -> Result<(), CliError> {
    let text = match Format::for_path(path) {
        Format::Json => serde_json::to_string_pretty(doc)
            .map(|t| t + "\n")
            .map_err(|e| manifest_err(path, e))?,
        Format::Yaml => serde_yaml::to_string(doc).map_err(|e| manifest_err(path, e))?,
        Format::Toml => toml::to_string_pretty(doc).map_err(|e| manifest_err(path, e))?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

fn site_name_of(value: &Value) -> Option<String> {
    value
        .get("site_name")
        .and_then(Value::as_str)
        .map(|n| n.trim().to_lowercase())
}

/// Insert or replace a captured site and its VLAN set in the manifest at
/// `path`, creating the file when it does not exist. Sites match by name,
/// case-insensitively; the captured row replaces the whole existing row.
pub fn upsert_reference(path: &Path, reference: &ReferenceSite) -> Result<(), CliError> {
    let mut root = if path.exists() {
        let Value::Object(root) = parse_document(path)? else {
            return Err(manifest_err(path, "top level must be a map"));
        };
        root
    } else {
        Map::new()
    };

    let site = serde_json::to_value(&reference.site).map_err(|e| manifest_err(path, e))?;
    let wanted = site_name_of(&site);
    let Value::Array(sites) = root
        .entry("sites")
        .or_insert_with(|| Value::Array(Vec::new()))
    else {
        return Err(manifest_err(path, "sites must be a list"));
    };
    match sites.iter().position(|s| wanted.is_some() && site_name_of(s) == wanted) {
        Some(idx) => sites[idx] = site,
        None => sites.push(site),
    }

    let vlans = serde_json::to_value(&reference.vlans).map_err(|e| manifest_err(path, e))?;
    let Value::Object(sets) = root
        .entry("vlan_sets")
        .or_insert_with(|| Value::Object(Map::new()))
    else {
        return Err(manifest_err(path, "vlan_sets must be a map"));
    };
    sets.insert(reference.vlan_set.clone(), vlans);

    write_document(path, &Value::Object(root))?;
    tracing::debug!(
        path = %path.display(),
        vlan_set = %reference.vlan_set,
        "upserted reference site"
    );
    Ok(())
}

/// A VLAN file is a bare list or a map with a `vlans` list.
fn read_vlans_file(path: &Path) -> Result<Vec<RawRow>, CliError> {
    let doc = parse_document(path)?;
    match &doc {
        Value::Array(_) => to_rows(path, "vlans", &doc),
        Value::Object(map) => match map.get("vlans") {
            Some(list) => to_rows(path, "vlans", list),
            None => Err(manifest_err(path, "missing `vlans` list")),
        },
        _ => Err(manifest_err(path, "expected a VLAN list")),
    }
}
