//! The enrichment pass: walk the install root, build evidence per install,
//! match against the catalog, and write resolved attributes through the
//! sink. Also hosts the update check and the single-install diagnose report.

use crate::evidence::{collect_install_evidence, InstallEvidence};
use crate::forge::{CatalogClient, ForgeError, ForgeMod, UpdateReport};
use crate::mapping::{find_mapping, load_mapping, MappingEntry};
use crate::matcher::{
    build_search_terms, GenericGuidRules, InstallInfo, MatchOutcome, Matcher,
};
use crate::scanner::list_install_dirs;
use crate::similarity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("attribute write failed for {install}: {reason}")]
    Sink { install: String, reason: String },
    #[error(transparent)]
    Catalog(#[from] ForgeError),
}

/// Attributes resolved from a catalog match. Fields that stay `None` are
/// never written to the sink's backing store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `sptforge:<guid>`, marking where these attributes came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl ResolvedAttributes {
    pub fn from_match(entry: &ForgeMod, confidence: u8, version: Option<&str>) -> Self {
        ResolvedAttributes {
            guid: Some(entry.guid.clone()),
            catalog_id: Some(entry.id),
            slug: Some(entry.slug.clone()),
            name: Some(entry.name.clone()),
            owner: entry.owner_name().map(|o| o.to_string()),
            detail_url: entry.detail_url.clone(),
            thumbnail: entry.thumbnail.clone(),
            version: version.map(|v| v.to_string()),
            provenance: Some(format!("sptforge:{}", entry.guid)),
            confidence: Some(confidence),
        }
    }
}

/// Receives resolved attributes for one install.
#[async_trait]
pub trait AttributeSink: Send + Sync {
    async fn set_attributes(
        &self,
        install_id: &str,
        attributes: &ResolvedAttributes,
    ) -> Result<(), EnrichError>;
}

/// Writes a `forge.json` sidecar into the install folder.
pub struct SidecarSink {
    install_root: PathBuf,
}

const SIDECAR_FILE: &str = "forge.json";

impl SidecarSink {
    pub fn new(install_root: PathBuf) -> Self {
        SidecarSink { install_root }
    }
}

#[async_trait]
impl AttributeSink for SidecarSink {
    async fn set_attributes(
        &self,
        install_id: &str,
        attributes: &ResolvedAttributes,
    ) -> Result<(), EnrichError> {
        let path = self.install_root.join(install_id).join(SIDECAR_FILE);
        let json = serde_json::to_string_pretty(attributes).map_err(|e| EnrichError::Sink {
            install: install_id.to_string(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(&path, json).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Counts for one enrichment pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichReport {
    pub enriched: usize,
    pub skipped: usize,
}

/// Run one sequential enrichment pass over every install under the root.
pub async fn enrich_installs(
    catalog: &dyn CatalogClient,
    sink: &dyn AttributeSink,
    install_root: &Path,
    mapping_path: &Path,
    rules: GenericGuidRules,
) -> Result<EnrichReport, EnrichError> {
    let mapping = load_mapping(mapping_path).await;
    let installs = list_install_dirs(install_root);
    info!("Enriching {} installs under {}", installs.len(), install_root.display());

    let mut matcher = Matcher::with_rules(catalog, rules);
    let mut report = EnrichReport::default();

    for folder in &installs {
        let evidence = collect_install_evidence(install_root, folder);
        let install = InstallInfo::from_folder(folder);
        match matcher.match_install(&install, &evidence, &mapping).await {
            MatchOutcome::Matched {
                entry, confidence, ..
            } => {
                let attrs =
                    ResolvedAttributes::from_match(&entry, confidence, evidence.version.as_deref());
                match sink.set_attributes(folder, &attrs).await {
                    Ok(()) => report.enriched += 1,
                    Err(e) => {
                        warn!("Attribute write failed for {}: {}", folder, e);
                        report.skipped += 1;
                    }
                }
            }
            MatchOutcome::Unmatched => report.skipped += 1,
        }
    }

    info!(
        "Pass complete: {} enriched, {} skipped",
        report.enriched, report.skipped
    );
    Ok(report)
}

/// Read back the attributes a previous enrichment pass left in the install
/// folder, if any.
async fn sidecar_attributes(install_root: &Path, folder: &str) -> Option<ResolvedAttributes> {
    let path = install_root.join(folder).join(SIDECAR_FILE);
    let raw = tokio::fs::read_to_string(&path).await.ok()?;
    serde_json::from_str(&raw).ok()
}

/// Collect `guid:version` pairs from every install and ask the catalog which
/// have newer releases. The guid comes from the sidecar a prior enrichment
/// pass wrote, when one exists; raw binary evidence can carry an identifier
/// the portal has never heard of, so it is only a fallback. The version is
/// whatever the install currently carries.
pub async fn check_updates(
    catalog: &dyn CatalogClient,
    install_root: &Path,
    spt_version: Option<&str>,
) -> Result<UpdateReport, EnrichError> {
    let installs = list_install_dirs(install_root);
    let mut pairs: Vec<(String, String)> = Vec::new();
    for folder in &installs {
        let evidence = collect_install_evidence(install_root, folder);
        let resolved = sidecar_attributes(install_root, folder).await;
        let guid = resolved
            .as_ref()
            .and_then(|r| r.guid.clone())
            .or_else(|| evidence.guid.clone());
        let version = evidence
            .version
            .clone()
            .or_else(|| resolved.and_then(|r| r.version));
        if let (Some(guid), Some(version)) = (guid, version) {
            pairs.push((guid, version));
        }
    }
    pairs.sort();
    pairs.dedup();

    if pairs.is_empty() {
        info!("No installs with both guid and version; nothing to check");
        return Ok(UpdateReport::default());
    }

    debug!("Checking updates for {} installs", pairs.len());
    Ok(catalog.get_update_status(&pairs, spt_version).await?)
}

/// Everything the matcher would have seen for one install, for humans.
#[derive(Debug, Serialize)]
pub struct DiagnoseReport {
    pub folder: String,
    pub evidence: DiagnoseEvidence,
    pub mapping_hit: Option<String>,
    pub terms: Vec<TermResults>,
}

#[derive(Debug, Serialize)]
pub struct DiagnoseEvidence {
    pub guid: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub guesses: Vec<String>,
    pub plugin_names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TermResults {
    pub term: String,
    pub results: Vec<ScoredResult>,
}

#[derive(Debug, Serialize)]
pub struct ScoredResult {
    pub guid: String,
    pub name: String,
    pub score: u8,
}

/// Build the diagnose report for a single install folder.
pub async fn diagnose_install(
    catalog: &dyn CatalogClient,
    install_root: &Path,
    mapping_path: &Path,
    folder: &str,
) -> Result<DiagnoseReport, EnrichError> {
    let evidence = collect_install_evidence(install_root, folder);
    let mapping = load_mapping(mapping_path).await;
    let mapping_hit =
        find_mapping(&mapping, Some(&evidence), Some(folder)).map(|m| m.target.clone());

    let install = InstallInfo::from_folder(folder);
    let version = evidence.version.clone();
    let terms = build_search_terms(&install, &evidence, version.as_deref());

    let mut term_results = Vec::new();
    for term in &terms {
        let results = match catalog.search(term, 10).await {
            Ok(r) => r,
            Err(e) => {
                debug!("Diagnose search failed for '{}': {}", term, e);
                Vec::new()
            }
        };
        let scored = results
            .iter()
            .map(|entry| ScoredResult {
                guid: entry.guid.clone(),
                name: entry.name.clone(),
                score: similarity::score(term, &entry.name)
                    .max(similarity::score(term, &entry.slug)),
            })
            .collect();
        term_results.push(TermResults {
            term: term.clone(),
            results: scored,
        });
    }

    Ok(DiagnoseReport {
        folder: folder.to_string(),
        evidence: diagnose_evidence(&evidence),
        mapping_hit,
        terms: term_results,
    })
}

fn diagnose_evidence(evidence: &InstallEvidence) -> DiagnoseEvidence {
    DiagnoseEvidence {
        guid: evidence.guid.clone(),
        version: evidence.version.clone(),
        display_name: evidence.display_name.clone(),
        guesses: evidence.guesses.clone(),
        plugin_names: evidence
            .plugin_display_names()
            .iter()
            .map(|n| n.to_string())
            .collect(),
    }
}

/// Re-exported for the CLI's mapping subcommands.
pub async fn import_mapping_file(
    source: &Path,
    mapping_path: &Path,
) -> Result<Vec<MappingEntry>, EnrichError> {
    let content = tokio::fs::read_to_string(source).await?;
    let entries = crate::mapping::parse_mapping_content(&content);
    crate::mapping::save_mapping(mapping_path, &entries)
        .await
        .map_err(|e| EnrichError::Sink {
            install: mapping_path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(entries)
}
