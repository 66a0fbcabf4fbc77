// Test support utilities for both unit and integration tests

use crate::acquire::{AcquireError, ArchiveImporter};
use crate::enrich::{AttributeSink, EnrichError, ResolvedAttributes};
use crate::forge::{CatalogClient, ForgeError, ForgeMod, UpdateEntry, UpdateReport};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-memory catalog for testing
///
/// Seeded with entries; answers lookups by guid/slug and searches by
/// substring over name, slug, and guid. Records every query it sees.
#[derive(Default)]
pub struct MockCatalog {
    entries: Vec<ForgeMod>,
    update_report: Mutex<UpdateReport>,
    pub queries: Mutex<Vec<String>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<ForgeMod>) -> Self {
        MockCatalog {
            entries,
            ..Self::default()
        }
    }

    pub fn add(&mut self, entry: ForgeMod) {
        self.entries.push(entry);
    }

    pub fn set_update_report(&self, report: UpdateReport) {
        *self.update_report.lock().unwrap() = report;
    }

    fn record(&self, kind: &str, value: &str) {
        self.queries
            .lock()
            .unwrap()
            .push(format!("{}:{}", kind, value));
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CatalogClient for MockCatalog {
    async fn lookup_by_guid(&self, guid: &str) -> Result<Option<ForgeMod>, ForgeError> {
        self.record("guid", guid);
        Ok(self
            .entries
            .iter()
            .find(|e| e.guid.eq_ignore_ascii_case(guid))
            .cloned())
    }

    async fn lookup_by_slug(&self, slug: &str) -> Result<Option<ForgeMod>, ForgeError> {
        self.record("slug", slug);
        Ok(self
            .entries
            .iter()
            .find(|e| e.slug.eq_ignore_ascii_case(slug))
            .cloned())
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<ForgeMod>, ForgeError> {
        self.record("search", query);
        let needle = query.to_ascii_lowercase();
        // substring over identity text, mimicking the portal's loose search
        let hits: Vec<ForgeMod> = self
            .entries
            .iter()
            .filter(|e| {
                let hay = format!("{} {} {}", e.name, e.slug, e.guid).to_ascii_lowercase();
                needle
                    .split_whitespace()
                    .any(|w| hay.contains(w.trim_matches(|c: char| !c.is_ascii_alphanumeric())))
            })
            .take(max_results as usize)
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn get_detail(&self, id_or_slug: &str) -> Result<Option<ForgeMod>, ForgeError> {
        self.record("detail", id_or_slug);
        Ok(self
            .entries
            .iter()
            .find(|e| {
                e.slug.eq_ignore_ascii_case(id_or_slug)
                    || e.guid.eq_ignore_ascii_case(id_or_slug)
                    || e.id.to_string() == id_or_slug
            })
            .cloned())
    }

    async fn get_update_status(
        &self,
        pairs: &[(String, String)],
        _spt_version: Option<&str>,
    ) -> Result<UpdateReport, ForgeError> {
        for (guid, version) in pairs {
            self.record("updates", &format!("{}:{}", guid, version));
        }
        Ok(self.update_report.lock().unwrap().clone())
    }
}

/// Records attribute writes in memory instead of touching the filesystem.
#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<HashMap<String, ResolvedAttributes>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> HashMap<String, ResolvedAttributes> {
        self.writes.lock().unwrap().clone()
    }

    pub fn get(&self, install_id: &str) -> Option<ResolvedAttributes> {
        self.writes.lock().unwrap().get(install_id).cloned()
    }
}

#[async_trait::async_trait]
impl AttributeSink for RecordingSink {
    async fn set_attributes(
        &self,
        install_id: &str,
        attributes: &ResolvedAttributes,
    ) -> Result<(), EnrichError> {
        self.writes
            .lock()
            .unwrap()
            .insert(install_id.to_string(), attributes.clone());
        Ok(())
    }
}

/// Records imported archive paths instead of moving them.
#[derive(Default)]
pub struct RecordingImporter {
    imports: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn imported(&self) -> Vec<(PathBuf, String)> {
        self.imports.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ArchiveImporter for RecordingImporter {
    async fn import(&self, archive: &Path, entry: &UpdateEntry) -> Result<(), AcquireError> {
        self.imports
            .lock()
            .unwrap()
            .push((archive.to_path_buf(), entry.guid.clone()));
        Ok(())
    }
}
