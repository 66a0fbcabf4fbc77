//! The human-curated override table.
//!
//! Entries map a normalized local key (guid, display name or folder name) to
//! a portal target. A hit here always outranks anything the heuristics come
//! up with; curation exists precisely for the installs the heuristics get
//! wrong.

use crate::evidence::InstallEvidence;
use crate::heuristics::{strip_archive_ext, strip_trailing_version};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What the target field of an entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Guid,
    Slug,
}

/// One curated override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub key: String,
    #[serde(default, rename = "keyRaw")]
    pub key_raw: String,
    pub target: String,
    #[serde(rename = "targetType")]
    pub target_kind: TargetKind,
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

/// Normalize a lookup key. Reverse-domain-shaped input is only lowercased;
/// anything else loses separators, spaces and one trailing `server`/`client`
/// suffix. Idempotent.
pub fn normalize_key(s: &str) -> String {
    let t = s.trim();
    if t.to_ascii_lowercase().starts_with("com.") {
        return t.to_ascii_lowercase();
    }
    let mut out: String = t
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    for suffix in ["server", "client"] {
        if out.len() > suffix.len() && out.ends_with(suffix) {
            out.truncate(out.len() - suffix.len());
            break;
        }
    }
    out
}

fn target_kind_of(value: &str) -> TargetKind {
    if value.to_ascii_lowercase().starts_with("com.") {
        TargetKind::Guid
    } else {
        TargetKind::Slug
    }
}

fn entry_from_pair(key_raw: &str, target: &str, raw: Option<serde_json::Value>) -> MappingEntry {
    MappingEntry {
        key: normalize_key(key_raw),
        key_raw: key_raw.to_string(),
        target: target.trim().to_string(),
        target_kind: target_kind_of(target),
        raw,
    }
}

/// Parse mapping content: a JSON array of entries, a legacy flat object map,
/// or free-text lines (`key -> value`, `key: value`, `key = value`, bare
/// token). Comment lines (`#`, `//`) are skipped.
pub fn parse_mapping_content(text: &str) -> Vec<MappingEntry> {
    let mut out = Vec::new();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return out;
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match json {
            serde_json::Value::Array(items) => {
                for item in items {
                    match &item {
                        serde_json::Value::String(s) => {
                            out.push(entry_from_pair(s, s, Some(item.clone())));
                        }
                        serde_json::Value::Object(map) => {
                            // Prefer the explicit entry shape, fall back to
                            // whatever identity-ish fields are present
                            let key = ["guid", "key", "name", "id", "slug"]
                                .iter()
                                .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                                .unwrap_or_default();
                            let target = ["target", "slug", "guid", "name", "id"]
                                .iter()
                                .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                                .unwrap_or(key);
                            if !key.is_empty() || !target.is_empty() {
                                let k = if key.is_empty() { target } else { key };
                                out.push(entry_from_pair(k, target, Some(item.clone())));
                            }
                        }
                        _ => {}
                    }
                }
                return out;
            }
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    if let Some(val) = v.as_str() {
                        out.push(entry_from_pair(&k, val, Some(v.clone())));
                    }
                }
                return out;
            }
            _ => {}
        }
    }

    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if let Some((k, v)) = split_mapping_line(line) {
            out.push(entry_from_pair(k, v, None));
        } else {
            out.push(entry_from_pair(line, line, None));
        }
    }
    out
}

/// Split `key -> value`, `key: value` or `key = value`.
fn split_mapping_line(line: &str) -> Option<(&str, &str)> {
    for sep in ["->", ":", "="] {
        if let Some(idx) = line.find(sep) {
            let key = line[..idx].trim();
            let value = line[idx + sep.len()..].trim_start_matches('>').trim();
            if !key.is_empty() && !value.is_empty() {
                return Some((key, value));
            }
        }
    }
    None
}

/// Load the mapping file. A missing file is an empty table, a legacy flat
/// object map is upgraded to the entry shape on the fly.
pub async fn load_mapping(path: &Path) -> Vec<MappingEntry> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => parse_mapping_content(&raw),
        Err(_) => Vec::new(),
    }
}

/// Persist the table as a JSON array of canonical entries.
pub async fn save_mapping(path: &Path, entries: &[MappingEntry]) -> Result<(), MappingError> {
    let json = serde_json::to_string_pretty(entries)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Find the override for an install, if any. Lookup keys in precedence
/// order: evidence guid, evidence display name, version-stripped folder
/// name, then each plugin-binary display name.
pub fn find_mapping<'a>(
    entries: &'a [MappingEntry],
    evidence: Option<&InstallEvidence>,
    folder_name: Option<&str>,
) -> Option<&'a MappingEntry> {
    let mut keys: Vec<String> = Vec::new();
    if let Some(meta) = evidence {
        if let Some(guid) = &meta.guid {
            keys.push(normalize_key(guid));
        }
        if let Some(name) = &meta.display_name {
            keys.push(normalize_key(name));
        }
    }
    if let Some(folder) = folder_name {
        keys.push(normalize_key(strip_trailing_version(strip_archive_ext(folder)).as_str()));
    }
    if let Some(meta) = evidence {
        for name in meta.plugin_display_names() {
            keys.push(normalize_key(name));
        }
    }

    keys.iter()
        .filter(|k| !k.is_empty())
        .find_map(|k| entries.iter().find(|e| e.key.eq_ignore_ascii_case(k)))
}
