//! Best-effort identity extraction from the binary modules of a staged
//! install.
//!
//! A plugin DLL usually carries a `BepInPlugin("guid", "Name", "1.2.3")`
//! declaration whose three literals survive in the binary as plain text.
//! When that is missing we fall back to assembly attribute strings and raw
//! reverse-domain token scanning. Extraction never fails: unreadable or
//! unparsable input simply yields empty evidence.

use crate::heuristics::looks_like_guid;
use crate::scanner::{walk_files, WalkLimits};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    /// A plugin DLL under the install folder
    PluginBinary,
    /// A server-mod `package.json` manifest
    Manifest,
}

/// How confidently the identity was recognized within its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The three-literal plugin declaration was found
    Structured,
    /// Assembled from loose token scanning
    Pattern,
}

/// One identity signal from one file.
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub source: EvidenceSource,
    pub origin: PathBuf,
    pub guid: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub match_kind: MatchKind,
}

/// Aggregated evidence for one install, built once per pass and discarded.
#[derive(Debug, Clone, Default)]
pub struct InstallEvidence {
    pub guid: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub items: Vec<EvidenceItem>,
    pub guesses: Vec<String>,
}

impl InstallEvidence {
    /// Display names contributed by plugin binaries, in scan order.
    pub fn plugin_display_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|e| e.source == EvidenceSource::PluginBinary)
            .filter_map(|e| e.display_name.as_deref())
            .collect()
    }
}

/// Fields recognized in a single binary module.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPlugin {
    pub guid: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub match_kind: Option<MatchKind>,
}

/// Byte distance scanned around an identifier when hunting for its version.
pub const VERSION_WINDOW: usize = 200;

const MAX_STRUCTURED_MATCHES: usize = 10;
const MAX_TOKEN_MATCHES: usize = 50;

fn plugin_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"BepInPlugin\s*\(\s*["']([^"']+)["']\s*,\s*["']([^"']+)["']\s*,\s*["']([^"']+)["']\s*\)"#,
        )
        .expect("plugin declaration regex")
    })
}

fn assembly_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\[assembly:\s*(?:AssemblyTitle|AssemblyProduct|AssemblyDescription)\s*\(\s*["']([^"']+)["']\s*\)\s*\]"#,
        )
        .expect("assembly title regex")
    })
}

fn assembly_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)AssemblyVersion\s*\(\s*["']([^"']+)["']\s*\)"#)
            .expect("assembly version regex")
    })
}

fn com_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bcom\.[a-z0-9_.\-]{3,}\b").expect("com token regex"))
}

fn dotted_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[a-z][a-z0-9_\-]*(?:\.[a-z0-9_\-]+){2,}\b").expect("dotted token regex")
    })
}

fn semver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\.\d+\.\d+(?:\.\d+)?\b").expect("semver regex"))
}

/// Decode raw module bytes one-byte-per-char so embedded ASCII literals
/// survive regardless of surrounding binary noise.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn normalize_guid(s: &str) -> String {
    s.trim().trim_matches(['.', '-']).to_ascii_lowercase()
}

/// Pick the most plausible identifier from a set of candidates: prefer
/// reverse-domain-shaped ones, then the shortest.
pub fn pick_best_guid<'a, I: IntoIterator<Item = &'a str>>(candidates: I) -> Option<String> {
    let mut uniq: Vec<String> = Vec::new();
    for c in candidates {
        let t = normalize_guid(c);
        if !t.is_empty() && !uniq.contains(&t) {
            uniq.push(t);
        }
    }
    let mut pool: Vec<&String> = uniq.iter().filter(|g| looks_like_guid(g)).collect();
    if pool.is_empty() {
        pool = uniq.iter().collect();
    }
    pool.sort_by_key(|g| g.len());
    pool.first().map(|g| (*g).clone())
}

/// Scan one binary module for identity/version/name tokens.
///
/// The structured path wins when a plugin declaration is present; otherwise
/// loose token scanning pairs the most plausible identifier with a version
/// found within [`VERSION_WINDOW`] characters of it, or with an assembly
/// version attribute.
pub fn extract_from_module(bytes: &[u8]) -> ExtractedPlugin {
    let text = decode_latin1(bytes);

    // Structured path: BepInPlugin("guid", "name", "version")
    let decls: Vec<(String, String, String)> = plugin_decl_re()
        .captures_iter(&text)
        .take(MAX_STRUCTURED_MATCHES)
        .map(|c| (normalize_guid(&c[1]), c[2].to_string(), c[3].to_string()))
        .collect();
    if !decls.is_empty() {
        let best_guid = pick_best_guid(decls.iter().map(|d| d.0.as_str()));
        let best = best_guid
            .as_deref()
            .and_then(|g| decls.iter().find(|d| d.0 == g))
            .unwrap_or(&decls[0]);
        return ExtractedPlugin {
            guid: Some(best.0.clone()),
            display_name: Some(best.1.clone()),
            version: Some(best.2.clone()),
            match_kind: Some(MatchKind::Structured),
        };
    }

    // Fallback path: assembly attributes + raw token scanning
    let display_name = assembly_title_re()
        .captures(&text)
        .map(|c| c[1].to_string());

    // Prefer a dotted slug-shaped identifier with a semantic version nearby
    // over a generic com.* token.
    let mut guid: Option<String> = None;
    let mut version: Option<String> = None;
    for m in dotted_token_re().find_iter(&text).take(MAX_TOKEN_MATCHES) {
        let token = m.as_str();
        if token.to_ascii_lowercase().starts_with("com.") {
            continue;
        }
        if let Some(v) = version_near(&text, m.start(), m.end()) {
            guid = Some(normalize_guid(token));
            version = Some(v);
            break;
        }
    }

    if guid.is_none() {
        let tokens: Vec<String> = com_token_re()
            .find_iter(&text)
            .take(MAX_TOKEN_MATCHES)
            .map(|m| normalize_guid(m.as_str()))
            .collect();
        guid = pick_best_guid(tokens.iter().map(|s| s.as_str()));
        if let Some(g) = &guid {
            if let Some(pos) = text.to_ascii_lowercase().find(g.as_str()) {
                version = version_near(&text, pos, pos + g.len());
            }
        }
    }

    if version.is_none() {
        version = assembly_version_re().captures(&text).map(|c| c[1].to_string());
    }

    ExtractedPlugin {
        guid,
        version,
        display_name,
        match_kind: Some(MatchKind::Pattern),
    }
}

/// Find a semantic-version-shaped value within the scan window around an
/// identifier occurrence.
fn version_near(text: &str, start: usize, end: usize) -> Option<String> {
    let mut lo = start.saturating_sub(VERSION_WINDOW);
    let mut hi = (end + VERSION_WINDOW).min(text.len());
    // High bytes decode to two-byte chars, so window edges may fall inside one
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    semver_re().find(&text[lo..hi]).map(|m| m.as_str().to_string())
}

#[derive(Default)]
struct GuidStats {
    structured: usize,
    with_version: usize,
    total: usize,
    version: Option<String>,
    display_name: Option<String>,
}

/// Fold per-module evidence into a single best identity.
///
/// Ranking: structured-match count, then version-presence count, then total
/// occurrence count, then shorter identifier.
pub fn aggregate_evidence(items: &[EvidenceItem]) -> Option<(String, Option<String>, Option<String>)> {
    let mut stats: Vec<(String, GuidStats)> = Vec::new();
    for item in items {
        let Some(guid) = &item.guid else { continue };
        let entry = match stats.iter_mut().find(|(g, _)| g == guid) {
            Some((_, s)) => s,
            None => {
                stats.push((guid.clone(), GuidStats::default()));
                &mut stats.last_mut().expect("just pushed").1
            }
        };
        entry.total += 1;
        if item.match_kind == MatchKind::Structured {
            entry.structured += 1;
        }
        if let Some(v) = &item.version {
            entry.with_version += 1;
            if entry.version.is_none() || item.match_kind == MatchKind::Structured {
                entry.version = Some(v.clone());
            }
        }
        if entry.display_name.is_none() {
            entry.display_name = item.display_name.clone();
        }
    }

    stats.sort_by(|(ga, a), (gb, b)| {
        b.structured
            .cmp(&a.structured)
            .then(b.with_version.cmp(&a.with_version))
            .then(b.total.cmp(&a.total))
            .then(ga.len().cmp(&gb.len()))
    });

    stats
        .into_iter()
        .next()
        .map(|(g, s)| (g, s.version, s.display_name))
}

/// Limits for the plugin-binary walk inside one install folder.
const MODULE_WALK: WalkLimits = WalkLimits {
    max_depth: 10,
    max_files: 120,
};

/// Limits for the server-mod manifest walk.
const MANIFEST_WALK: WalkLimits = WalkLimits {
    max_depth: 4,
    max_files: 10,
};

/// Build the full evidence set for one install folder.
pub fn collect_install_evidence(install_root: &Path, folder_name: &str) -> InstallEvidence {
    let mut out = InstallEvidence::default();
    let folder = install_root.join(folder_name);

    let modules = walk_files(&folder, MODULE_WALK, &|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("dll"))
            .unwrap_or(false)
    });

    for module in modules {
        let Ok(bytes) = std::fs::read(&module) else {
            debug!("Unreadable module skipped: {:?}", module);
            continue;
        };
        let info = extract_from_module(&bytes);
        if let Some(guid) = info.guid {
            out.items.push(EvidenceItem {
                source: EvidenceSource::PluginBinary,
                origin: module,
                guid: Some(guid),
                version: info.version,
                display_name: info.display_name,
                match_kind: info.match_kind.unwrap_or(MatchKind::Pattern),
            });
        }
    }

    if let Some((guid, version, display_name)) = aggregate_evidence(&out.items) {
        out.guid = Some(guid);
        out.version = version;
        out.display_name = display_name;
    }

    // Server-only mods carry no DLLs; their package.json manifests still
    // name and version the mod.
    let server_mods = folder.join("user").join("mods");
    if server_mods.is_dir() {
        let manifests = walk_files(&server_mods, MANIFEST_WALK, &|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.eq_ignore_ascii_case("package.json"))
                .unwrap_or(false)
        });
        for manifest in manifests {
            let Ok(raw) = std::fs::read_to_string(&manifest) else { continue };
            let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) else { continue };
            let version = json.get("version").and_then(|v| v.as_str()).map(String::from);
            let name = json.get("name").and_then(|v| v.as_str()).map(String::from);
            out.items.push(EvidenceItem {
                source: EvidenceSource::Manifest,
                origin: manifest,
                guid: None,
                version: version.clone(),
                display_name: name.clone(),
                match_kind: MatchKind::Pattern,
            });
            if out.version.is_none() {
                out.version = version;
            }
            if out.display_name.is_none() {
                out.display_name = name;
            }
        }
    }

    out.guesses = crate::heuristics::guess_guids_from_folder_name(folder_name);
    if out.guid.is_none() {
        out.guid = out.guesses.first().cloned();
    }

    out
}
