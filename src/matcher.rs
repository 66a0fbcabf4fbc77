//! The five-tier candidate matcher.
//!
//! Precedence, stopping at the first success: curated override, direct guid
//! lookup, folder-guess guid lookup, term-based catalog search (exact tier
//! then fuzzy tier), and finally a narrow plain-similarity fallback. Human
//! overrides are never second-guessed; exact identifiers outrank names;
//! exact names outrank fuzzy text.

use crate::evidence::InstallEvidence;
use crate::forge::{CatalogClient, ForgeMod};
use crate::heuristics::{
    name_from_guid, slugify, split_camel_case, strip_archive_ext, strip_component_suffix,
    strip_trailing_version, version_from_folder_name,
};
use crate::mapping::{find_mapping, MappingEntry, TargetKind};
use crate::similarity;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Matcher constants. Empirically tuned in a predecessor tool; preserved for
/// behavioral parity rather than re-derived.
pub mod tuning {
    /// Minimum raw similarity (0-100) for a fuzzy-tier acceptance, and the
    /// score at which term scanning stops early.
    pub const MIN_FUZZY_SCORE: u8 = 70;
    /// Fuzzy-tier confidence is `floor(raw × FUZZY_CONFIDENCE_SCALE)`.
    pub const FUZZY_CONFIDENCE_SCALE: f64 = 0.85;
    /// Exact-tier confidences.
    pub const EXACT_NAME_CONFIDENCE: u8 = 95;
    pub const STRIPPED_NAME_CONFIDENCE: u8 = 93;
    pub const SLUG_CONFIDENCE: u8 = 92;
    pub const OWNER_NAME_CONFIDENCE: u8 = 90;
    /// Added when a fuzzy candidate's identity text carries the install's
    /// version token. A versioned-name hit is strong corroboration.
    pub const VERSION_MATCH_BOOST: u8 = 25;
    /// Result cap per search query.
    pub const MAX_SEARCH_RESULTS: u32 = 100;
    /// Term scanning stops once this confidence is reached.
    pub const EARLY_STOP_CONFIDENCE: u8 = 95;
    /// Override hits and the confidence ceiling.
    pub const MAX_CONFIDENCE: u8 = 100;
}

/// Deny-list for identifiers that belong to shared runtime components
/// rather than the mod itself. Deliberately conservative; extend through
/// configuration, not here.
#[derive(Debug, Clone)]
pub struct GenericGuidRules {
    /// Matched against whole leading segments (`com.spt` denies `com.spt`
    /// and `com.spt.core` but not `com.sptquesting`).
    pub segment_prefixes: Vec<String>,
    /// Matched as plain string prefixes.
    pub raw_prefixes: Vec<String>,
    /// Shorter identifiers than this are never trusted.
    pub min_length: usize,
}

impl Default for GenericGuidRules {
    fn default() -> Self {
        GenericGuidRules {
            segment_prefixes: vec![
                "com.spt".into(),
                "com.spt_core".into(),
                "com.sptcore".into(),
                "com.unity".into(),
            ],
            raw_prefixes: vec!["unity.".into()],
            min_length: 8,
        }
    }
}

impl GenericGuidRules {
    /// Whether a guid identifies a shared platform component and must not be
    /// used for a direct lookup.
    pub fn is_generic(&self, guid: &str) -> bool {
        let g = guid.trim().to_ascii_lowercase();
        if g.is_empty() {
            return false;
        }
        if g.len() < self.min_length {
            return true;
        }
        for p in &self.segment_prefixes {
            if g == *p || g.starts_with(&format!("{}.", p)) {
                return true;
            }
        }
        for p in &self.raw_prefixes {
            if g.starts_with(p.as_str()) {
                return true;
            }
        }
        // engine/core runtime catch-all
        g.starts_with("com.") && g.contains("core")
    }
}

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    Override,
    DirectGuid,
    GuessGuid,
    ExactName,
    StrippedName,
    SlugEquality,
    OwnerAndName,
    FuzzySearch,
    NarrowFallback,
}

/// Terminal state of the per-install matching state machine.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched {
        entry: ForgeMod,
        confidence: u8,
        method: MatchMethod,
    },
    Unmatched,
}

impl MatchOutcome {
    pub fn entry(&self) -> Option<&ForgeMod> {
        match self {
            MatchOutcome::Matched { entry, .. } => Some(entry),
            MatchOutcome::Unmatched => None,
        }
    }
}

/// Locally known attributes of one install fed into the matcher.
#[derive(Debug, Clone, Default)]
pub struct InstallInfo {
    pub folder_name: String,
    /// Name declared on the install record, if any; the folder name
    /// (version-stripped) stands in otherwise.
    pub declared_name: Option<String>,
    pub author: Option<String>,
}

impl InstallInfo {
    pub fn from_folder(folder_name: &str) -> Self {
        InstallInfo {
            folder_name: folder_name.to_string(),
            declared_name: None,
            author: None,
        }
    }

    /// The local display name: declared name, or the folder name with the
    /// archive extension and trailing version stripped.
    pub fn local_name(&self) -> String {
        self.declared_name
            .clone()
            .unwrap_or_else(|| strip_trailing_version(strip_archive_ext(&self.folder_name)))
    }
}

/// Per-pass matcher. Holds the catalog capability and a cache that
/// short-circuits repeated lookups for installs sharing an identity.
pub struct Matcher<'a> {
    catalog: &'a dyn CatalogClient,
    rules: GenericGuidRules,
    cache: HashMap<String, ForgeMod>,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a dyn CatalogClient) -> Self {
        Self::with_rules(catalog, GenericGuidRules::default())
    }

    pub fn with_rules(catalog: &'a dyn CatalogClient, rules: GenericGuidRules) -> Self {
        Matcher {
            catalog,
            rules,
            cache: HashMap::new(),
        }
    }

    /// Run the full precedence chain for one install.
    pub async fn match_install(
        &mut self,
        install: &InstallInfo,
        evidence: &InstallEvidence,
        mapping: &[MappingEntry],
    ) -> MatchOutcome {
        let folder = &install.folder_name;

        // 1. Curated override
        if let Some(hit) = find_mapping(mapping, Some(evidence), Some(folder)) {
            debug!(
                "Mapping hit for {}: {} ({:?})",
                folder, hit.target, hit.target_kind
            );
            let resolved = match hit.target_kind {
                TargetKind::Guid => self.lookup_guid_cached(&hit.target).await,
                TargetKind::Slug => self.catalog.lookup_by_slug(&hit.target).await.ok().flatten(),
            };
            if let Some(entry) = resolved {
                self.remember(&entry);
                info!("Matched {} via mapping -> {} ({})", folder, entry.guid, entry.name);
                return MatchOutcome::Matched {
                    entry,
                    confidence: tuning::MAX_CONFIDENCE,
                    method: MatchMethod::Override,
                };
            }
            warn!("Mapping target {} did not resolve against the catalog", hit.target);
        }

        // 2. Direct guid lookup from binary evidence
        if let Some(guid) = &evidence.guid {
            if self.rules.is_generic(guid) {
                debug!("Demoting generic guid {} for {}", guid, folder);
            } else if let Some(entry) = self.lookup_guid_cached(guid).await {
                self.remember(&entry);
                debug!("Matched {} by guid {}", folder, guid);
                return MatchOutcome::Matched {
                    entry,
                    confidence: tuning::MAX_CONFIDENCE,
                    method: MatchMethod::DirectGuid,
                };
            }
        }

        // 3. Direct guid lookup from folder guesses
        for guess in &evidence.guesses {
            if self.rules.is_generic(guess) {
                debug!("Skipping generic guess {} for {}", guess, folder);
                continue;
            }
            if let Some(entry) = self.lookup_guid_cached(guess).await {
                self.remember(&entry);
                debug!("Matched {} by guessed guid {}", folder, guess);
                return MatchOutcome::Matched {
                    entry,
                    confidence: tuning::MAX_CONFIDENCE,
                    method: MatchMethod::GuessGuid,
                };
            }
        }

        // 4. Term-based search
        if let MatchOutcome::Matched { entry, confidence, method } =
            self.search_with_terms(install, evidence).await
        {
            self.remember(&entry);
            info!(
                "Matched {} -> {} ({}) confidence={} via {:?}",
                folder, entry.guid, entry.name, confidence, method
            );
            return MatchOutcome::Matched { entry, confidence, method };
        }

        // 5. Narrow fallback over raw display/folder names
        if let MatchOutcome::Matched { entry, confidence, method } =
            self.narrow_fallback(install, evidence).await
        {
            self.remember(&entry);
            info!(
                "Fuzzy-matched {} -> {} ({}) confidence={}",
                folder, entry.guid, entry.name, confidence
            );
            return MatchOutcome::Matched { entry, confidence, method };
        }

        info!("No catalog match for {}", folder);
        MatchOutcome::Unmatched
    }

    async fn lookup_guid_cached(&mut self, guid: &str) -> Option<ForgeMod> {
        let key = guid.to_ascii_lowercase();
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit.clone());
        }
        match self.catalog.lookup_by_guid(guid).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Guid lookup failed for {}: {}", guid, e);
                None
            }
        }
    }

    fn remember(&mut self, entry: &ForgeMod) {
        self.cache
            .insert(entry.guid.to_ascii_lowercase(), entry.clone());
    }

    /// Tier 4: ordered term search with exact and fuzzy scoring tiers.
    async fn search_with_terms(
        &mut self,
        install: &InstallInfo,
        evidence: &InstallEvidence,
    ) -> MatchOutcome {
        let version_token = evidence
            .version
            .clone()
            .or_else(|| version_from_folder_name(&install.folder_name));
        let terms = build_search_terms(install, evidence, version_token.as_deref());
        debug!("Search terms for {}: {:?}", install.folder_name, terms);

        let mut best: Option<(ForgeMod, u8, MatchMethod)> = None;
        let mut best_raw: u8 = 0;

        'terms: for term in &terms {
            let results = match self.catalog.search(term, tuning::MAX_SEARCH_RESULTS).await {
                Ok(results) => results,
                Err(e) => {
                    // A single failed query degrades to zero results
                    debug!("Search failed for term '{}': {}", term, e);
                    continue;
                }
            };
            if results.is_empty() {
                continue;
            }

            // Exact tier
            for entry in &results {
                if let Some((confidence, method)) = exact_tier(term, entry) {
                    let better = best
                        .as_ref()
                        .map(|(_, c, _)| confidence > *c)
                        .unwrap_or(true);
                    if better {
                        best = Some((entry.clone(), confidence, method));
                    }
                    if confidence >= tuning::EARLY_STOP_CONFIDENCE {
                        break 'terms;
                    }
                }
            }

            // Fuzzy tier: best similarity over name/slug
            for entry in &results {
                let raw = similarity::score(term, &entry.name).max(similarity::score(term, &entry.slug));
                if raw > best_raw && raw >= tuning::MIN_FUZZY_SCORE {
                    let confidence = fuzzy_confidence(raw, version_token.as_deref(), entry);
                    let better = best
                        .as_ref()
                        .map(|(_, c, _)| confidence > *c)
                        .unwrap_or(true);
                    if better {
                        best = Some((entry.clone(), confidence, MatchMethod::FuzzySearch));
                    }
                    best_raw = raw;
                }
            }

            if best_raw >= tuning::MIN_FUZZY_SCORE {
                break;
            }
            if let Some((_, c, _)) = &best {
                if *c >= tuning::EARLY_STOP_CONFIDENCE {
                    break;
                }
            }
        }

        match best {
            Some((entry, confidence, method)) => MatchOutcome::Matched {
                entry,
                confidence,
                method,
            },
            None => MatchOutcome::Unmatched,
        }
    }

    /// Tier 5: plain best-similarity sweep over the install's raw names.
    async fn narrow_fallback(
        &mut self,
        install: &InstallInfo,
        evidence: &InstallEvidence,
    ) -> MatchOutcome {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(name) = &evidence.display_name {
            candidates.push(name.clone());
        }
        candidates.push(install.folder_name.clone());
        for name in evidence.plugin_display_names() {
            candidates.push(name.to_string());
        }

        let mut best: Option<(ForgeMod, u8)> = None;
        for candidate in &candidates {
            let results = match self.catalog.search(candidate, tuning::MAX_SEARCH_RESULTS).await {
                Ok(results) => results,
                Err(e) => {
                    debug!("Fallback search failed for '{}': {}", candidate, e);
                    continue;
                }
            };
            for entry in &results {
                let raw = similarity::score(candidate, &entry.name)
                    .max(similarity::score(candidate, &entry.slug))
                    .max(similarity::score(candidate, &entry.guid));
                if raw > 0 && best.as_ref().map(|(_, s)| raw > *s).unwrap_or(true) {
                    best = Some((entry.clone(), raw));
                }
            }
        }

        match best {
            Some((entry, confidence)) => MatchOutcome::Matched {
                entry,
                confidence,
                method: MatchMethod::NarrowFallback,
            },
            None => MatchOutcome::Unmatched,
        }
    }
}

/// Exact-tier comparison of one search term against one catalog entry.
fn exact_tier(term: &str, entry: &ForgeMod) -> Option<(u8, MatchMethod)> {
    let norm_term = similarity::normalize(term);
    if norm_term.is_empty() {
        return None;
    }
    let norm_name = similarity::normalize(&entry.name);

    if norm_name == norm_term {
        // Owner corroboration upgrades nothing here; exact name is already
        // the top non-override signal
        return Some((tuning::EXACT_NAME_CONFIDENCE, MatchMethod::ExactName));
    }
    let stripped_name = similarity::normalize(strip_component_suffix(&entry.name));
    let stripped_term = similarity::normalize(strip_component_suffix(term));
    if !stripped_name.is_empty() && stripped_name == stripped_term {
        return Some((tuning::STRIPPED_NAME_CONFIDENCE, MatchMethod::StrippedName));
    }
    let norm_slug = similarity::normalize(&entry.slug);
    let guid_name = similarity::normalize(&name_from_guid(&entry.guid));
    if (!norm_slug.is_empty() && norm_slug == norm_term)
        || (!guid_name.is_empty() && guid_name == norm_term)
    {
        return Some((tuning::SLUG_CONFIDENCE, MatchMethod::SlugEquality));
    }
    if let Some(owner) = entry.owner_name() {
        // "owner name" style terms: exact name hit once the owner prefix is
        // peeled off
        let owner_norm = similarity::normalize(owner);
        if !owner_norm.is_empty() {
            if let Some(rest) = norm_term.strip_prefix(owner_norm.as_str()) {
                if !rest.is_empty() && rest == norm_name {
                    return Some((tuning::OWNER_NAME_CONFIDENCE, MatchMethod::OwnerAndName));
                }
            }
        }
    }
    None
}

/// Fuzzy-tier confidence: scaled raw score plus the version-corroboration
/// boost, capped at 100.
fn fuzzy_confidence(raw: u8, version_token: Option<&str>, entry: &ForgeMod) -> u8 {
    let mut confidence = (raw as f64 * tuning::FUZZY_CONFIDENCE_SCALE).floor() as u8;
    if let Some(version) = version_token {
        if candidate_mentions_version(entry, version) {
            confidence = confidence
                .saturating_add(tuning::VERSION_MATCH_BOOST)
                .min(tuning::MAX_CONFIDENCE);
        }
    }
    confidence
}

/// Whether the entry's identity text carries the version token, dotted or
/// compacted.
fn candidate_mentions_version(entry: &ForgeMod, version: &str) -> bool {
    if version.is_empty() {
        return false;
    }
    let text = entry.identity_text().to_ascii_lowercase();
    let dotted = version.to_ascii_lowercase();
    if text.contains(&dotted) {
        return true;
    }
    let compacted: String = dotted.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    !compacted.is_empty() && similarity::normalize(&text).contains(&compacted)
}

/// Build the ordered, de-duplicated search-term list for one install.
///
/// Terms must contain at least one letter; purely numeric fragments (version
/// leftovers) are dropped.
pub fn build_search_terms(
    install: &InstallInfo,
    evidence: &InstallEvidence,
    version_token: Option<&str>,
) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut add = |t: &str, terms: &mut Vec<String>, seen: &mut Vec<String>| {
        let t = t.trim();
        if t.is_empty()
            || !t.chars().any(|c| c.is_ascii_alphabetic())
            || seen.contains(&t.to_ascii_lowercase())
        {
            return;
        }
        seen.push(t.to_ascii_lowercase());
        terms.push(t.to_string());
    };

    let local_name = install.local_name();
    add(&local_name, &mut terms, &mut seen);

    let without_suffix = strip_component_suffix(&local_name);
    if without_suffix != local_name {
        add(without_suffix, &mut terms, &mut seen);
    }

    let spaced = split_camel_case(&local_name);
    if spaced != local_name {
        add(&spaced, &mut terms, &mut seen);
    }

    if let Some(guid) = &evidence.guid {
        add(&name_from_guid(guid), &mut terms, &mut seen);
    }
    for guess in &evidence.guesses {
        add(&name_from_guid(guess), &mut terms, &mut seen);
    }

    for name in evidence.plugin_display_names() {
        add(name, &mut terms, &mut seen);
    }

    add(&slugify(&local_name), &mut terms, &mut seen);
    add(&slugify(without_suffix), &mut terms, &mut seen);

    if let Some(version) = version_token {
        add(&format!("{} {}", local_name, version), &mut terms, &mut seen);
        add(&format!("{} v{}", local_name, version), &mut terms, &mut seen);
        add(&format!("{}-{}", local_name, version), &mut terms, &mut seen);
        add(
            &format!("{}-{}", slugify(&local_name), version),
            &mut terms,
            &mut seen,
        );
    }

    if let Some(author) = &install.author {
        if !author.trim().is_empty() && !author.eq_ignore_ascii_case("unknown") {
            add(&format!("{} {}", author, local_name), &mut terms, &mut seen);
        }
    }

    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(guid: &str, slug: &str, name: &str) -> ForgeMod {
        ForgeMod {
            id: 1,
            guid: guid.to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
            owner: None,
            thumbnail: None,
            teaser: None,
            detail_url: None,
            releases: Vec::new(),
            assets: Vec::new(),
        }
    }

    #[test]
    fn test_generic_guid_rules() {
        let rules = GenericGuidRules::default();
        assert!(rules.is_generic("com.spt"));
        assert!(rules.is_generic("com.spt.core"));
        assert!(rules.is_generic("unity.textmeshpro"));
        assert!(rules.is_generic("com.unity.burst"));
        assert!(rules.is_generic("com.example.corelib"));
        assert!(rules.is_generic("short"));
        assert!(!rules.is_generic("com.sptquesting.mod"));
        assert!(!rules.is_generic("com.turbodestroyer.croupier"));
    }

    #[test]
    fn test_exact_tier_name_equality() {
        let e = entry("com.harmonyzt.botcallsigns", "botcallsigns", "BotCallsigns");
        let (c, m) = exact_tier("BotCallsigns", &e).expect("exact hit");
        assert_eq!(c, tuning::EXACT_NAME_CONFIDENCE);
        assert_eq!(m, MatchMethod::ExactName);
    }

    #[test]
    fn test_exact_tier_stripped_suffix() {
        let e = entry("com.bb.bandits", "backdoor-bandits", "BackdoorBandits");
        let (c, _) = exact_tier("BackdoorBanditsServer", &e).expect("stripped hit");
        assert_eq!(c, tuning::STRIPPED_NAME_CONFIDENCE);
    }

    #[test]
    fn test_exact_tier_slug_equality() {
        let e = entry("com.x.y", "gilded-key-storage", "Gilded Key Storage Deluxe");
        let (c, m) = exact_tier("GildedKeyStorage", &e).expect("slug hit");
        assert_eq!(c, tuning::SLUG_CONFIDENCE);
        assert_eq!(m, MatchMethod::SlugEquality);
    }

    #[test]
    fn test_version_boost_strictly_raises_confidence() {
        let without = entry("com.turbodestroyer.croupier", "croupier", "Croupier");
        let with = entry(
            "com.turbodestroyer.croupier",
            "croupier-2-0-4",
            "Croupier 2.0.4",
        );
        let raw = 75;
        let base = fuzzy_confidence(raw, Some("2.0.4"), &without);
        let boosted = fuzzy_confidence(raw, Some("2.0.4"), &with);
        assert!(boosted > base);
        assert!(boosted <= tuning::MAX_CONFIDENCE);
        assert_eq!(base, (raw as f64 * tuning::FUZZY_CONFIDENCE_SCALE).floor() as u8);
    }

    #[test]
    fn test_version_boost_caps_at_100() {
        let e = entry("com.x.y", "mod-9-9-9", "Mod 9.9.9");
        assert_eq!(fuzzy_confidence(95, Some("9.9.9"), &e), 100);
    }

    #[test]
    fn test_compacted_version_detected() {
        let e = entry("com.x.y204z", "plain", "Plain");
        assert!(candidate_mentions_version(&e, "2.0.4"));
        let miss = entry("com.x.y", "plain", "Plain");
        assert!(!candidate_mentions_version(&miss, "2.0.4"));
    }

    #[test]
    fn test_build_search_terms_order_and_dedup() {
        let install = InstallInfo::from_folder("TaskAutomation-1.2.3");
        let evidence = InstallEvidence {
            guid: Some("btaskautomation.monobehaviours.core".to_string()),
            ..Default::default()
        };
        let terms = build_search_terms(&install, &evidence, Some("1.2.3"));
        assert_eq!(terms[0], "TaskAutomation");
        assert!(terms.iter().any(|t| t == "Task Automation"));
        assert!(terms.iter().any(|t| t == "task-automation"));
        assert!(terms.iter().any(|t| t == "TaskAutomation 1.2.3"));
        assert!(terms.iter().any(|t| t == "TaskAutomation v1.2.3"));
        // no duplicates, case-insensitively
        let mut lowered: Vec<String> = terms.iter().map(|t| t.to_ascii_lowercase()).collect();
        lowered.sort();
        lowered.dedup();
        assert_eq!(lowered.len(), terms.len());
    }

    #[test]
    fn test_terms_exclude_numeric_fragments() {
        let install = InstallInfo::from_folder("Croupier_2_0_4");
        let evidence = InstallEvidence::default();
        let terms = build_search_terms(&install, &evidence, Some("2.0.4"));
        assert!(terms.iter().all(|t| t.chars().any(|c| c.is_ascii_alphabetic())));
        assert_eq!(terms[0], "Croupier");
    }

    #[test]
    fn test_author_term_skipped_when_unknown() {
        let mut install = InstallInfo::from_folder("SomeMod-1.0");
        install.author = Some("Unknown".to_string());
        let terms = build_search_terms(&install, &InstallEvidence::default(), None);
        assert!(!terms.iter().any(|t| t.to_ascii_lowercase().contains("unknown")));
    }
}
