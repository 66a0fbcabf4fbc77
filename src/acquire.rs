//! Acquisition orchestrator: pick an asset, download it, verify it, hand it
//! to the importer. Each item fails on its own; the batch never aborts.

use crate::download::{verify_download, DownloadError, Downloader};
use crate::forge::{CatalogClient, ForgeError, ForgeMod, ReleaseAsset, UpdateEntry};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no downloadable asset for {0}")]
    NoAsset(String),
    #[error("catalog error: {0}")]
    Catalog(#[from] ForgeError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("import failed: {0}")]
    Import(String),
}

/// Consumes a verified archive. The CLI moves archives into a downloads
/// directory; tests record the call.
#[async_trait]
pub trait ArchiveImporter: Send + Sync {
    async fn import(&self, archive: &Path, entry: &UpdateEntry) -> Result<(), AcquireError>;
}

/// Moves verified archives into a flat downloads directory.
pub struct DownloadsDirImporter {
    dir: PathBuf,
}

impl DownloadsDirImporter {
    pub fn new(dir: PathBuf) -> Self {
        DownloadsDirImporter { dir }
    }
}

#[async_trait]
impl ArchiveImporter for DownloadsDirImporter {
    async fn import(&self, archive: &Path, entry: &UpdateEntry) -> Result<(), AcquireError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AcquireError::Import(e.to_string()))?;
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.zip", entry.guid));
        let target = self.dir.join(name);
        if target != archive {
            tokio::fs::rename(archive, &target)
                .await
                .map_err(|e| AcquireError::Import(e.to_string()))?;
        }
        info!("Imported {} -> {}", entry.guid, target.display());
        Ok(())
    }
}

const PREFERRED_EXTENSIONS: &[&str] = &["zip", "7z", "rar", "tar.gz", "tgz", "tar"];

fn has_preferred_ext(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PREFERRED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Pick the asset to download from a catalog detail record.
///
/// Release assets are scanned before top-level assets. Archive extensions
/// are preferred; among preferred candidates the largest wins.
pub fn pick_asset(detail: &ForgeMod) -> Option<&ReleaseAsset> {
    let release_assets = detail.releases.iter().flat_map(|r| r.assets.iter());
    let all: Vec<&ReleaseAsset> = release_assets.chain(detail.assets.iter()).collect();
    if all.is_empty() {
        return None;
    }

    let preferred: Vec<&&ReleaseAsset> = all
        .iter()
        .filter(|a| has_preferred_ext(&a.filename))
        .collect();

    let pool: Vec<&ReleaseAsset> = if preferred.is_empty() {
        all.clone()
    } else {
        preferred.into_iter().copied().collect()
    };

    pool.into_iter()
        .max_by_key(|a| a.size.unwrap_or(0))
}

fn filename_for(asset: &ReleaseAsset, entry: &UpdateEntry) -> String {
    if !asset.filename.trim().is_empty() {
        return asset.filename.clone();
    }
    asset
        .url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            let version = entry.latest_version.as_deref().unwrap_or("latest");
            format!("{}-{}.zip", entry.guid, version)
        })
}

/// Outcome counts for one acquisition batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcquireReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Download and import every update entry. Assets already listed on the
/// entry are used directly; otherwise the catalog detail record is fetched.
pub async fn acquire_updates(
    catalog: &dyn CatalogClient,
    downloader: &Downloader,
    importer: &dyn ArchiveImporter,
    staging_dir: &Path,
    entries: &[UpdateEntry],
) -> AcquireReport {
    let mut report = AcquireReport::default();
    for entry in entries {
        match acquire_one(catalog, downloader, importer, staging_dir, entry).await {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                warn!("Acquisition failed for {}: {}", entry.guid, e);
                report.failed += 1;
            }
        }
    }
    report
}

async fn acquire_one(
    catalog: &dyn CatalogClient,
    downloader: &Downloader,
    importer: &dyn ArchiveImporter,
    staging_dir: &Path,
    entry: &UpdateEntry,
) -> Result<(), AcquireError> {
    let asset = match select_entry_asset(entry) {
        Some(asset) => asset.clone(),
        None => {
            debug!("No asset on update entry {}; fetching detail", entry.guid);
            let mut detail = catalog.get_detail(&entry.guid).await?;
            if detail.is_none() {
                // the detail endpoint wants an id or slug
                if let Some(found) = catalog.lookup_by_guid(&entry.guid).await? {
                    detail = catalog.get_detail(&found.id.to_string()).await?.or(Some(found));
                }
            }
            let detail = detail.ok_or_else(|| AcquireError::NoAsset(entry.guid.clone()))?;
            pick_asset(&detail)
                .cloned()
                .ok_or_else(|| AcquireError::NoAsset(entry.guid.clone()))?
        }
    };

    let dest = staging_dir.join(filename_for(&asset, entry));
    downloader.download(&asset.url, &dest).await?;
    verify_download(&dest, &asset).await?;
    importer.import(&dest, entry).await
}

/// Apply the archive-extension/size preference to the entry's own assets.
fn select_entry_asset(entry: &UpdateEntry) -> Option<&ReleaseAsset> {
    let preferred: Vec<&ReleaseAsset> = entry
        .assets
        .iter()
        .filter(|a| has_preferred_ext(&a.filename))
        .collect();
    let pool = if preferred.is_empty() {
        entry.assets.iter().collect::<Vec<_>>()
    } else {
        preferred
    };
    pool.into_iter().max_by_key(|a| a.size.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::ForgeRelease;

    fn asset(name: &str, size: u64) -> ReleaseAsset {
        ReleaseAsset {
            url: format!("https://example.test/{}", name),
            filename: name.to_string(),
            size: Some(size),
            sha256: None,
        }
    }

    #[test]
    fn test_pick_prefers_archive_extensions() {
        let detail = ForgeMod {
            id: 1,
            guid: "com.x.y".to_string(),
            slug: "x".to_string(),
            name: "X".to_string(),
            owner: None,
            thumbnail: None,
            teaser: None,
            detail_url: None,
            releases: Vec::new(),
            assets: vec![asset("readme.txt", 9000), asset("mod.zip", 100)],
        };
        assert_eq!(
            pick_asset(&detail).map(|a| a.filename.as_str()),
            Some("mod.zip")
        );
    }

    #[test]
    fn test_pick_largest_among_preferred() {
        let detail = ForgeMod {
            id: 1,
            guid: "com.x.y".to_string(),
            slug: "x".to_string(),
            name: "X".to_string(),
            owner: None,
            thumbnail: None,
            teaser: None,
            detail_url: None,
            releases: vec![ForgeRelease {
                version: Some("1.0".to_string()),
                assets: vec![asset("small.zip", 10), asset("big.7z", 500)],
            }],
            assets: vec![asset("other.tar.gz", 50)],
        };
        assert_eq!(
            pick_asset(&detail).map(|a| a.filename.as_str()),
            Some("big.7z")
        );
    }

    #[test]
    fn test_pick_falls_back_to_any_asset() {
        let detail = ForgeMod {
            id: 1,
            guid: "com.x.y".to_string(),
            slug: "x".to_string(),
            name: "X".to_string(),
            owner: None,
            thumbnail: None,
            teaser: None,
            detail_url: None,
            releases: Vec::new(),
            assets: vec![asset("loose.dll", 42)],
        };
        assert!(pick_asset(&detail).is_some());
    }

    #[test]
    fn test_pick_none_when_empty() {
        let detail = ForgeMod {
            id: 1,
            guid: "com.x.y".to_string(),
            slug: "x".to_string(),
            name: "X".to_string(),
            owner: None,
            thumbnail: None,
            teaser: None,
            detail_url: None,
            releases: Vec::new(),
            assets: Vec::new(),
        };
        assert!(pick_asset(&detail).is_none());
    }

    #[test]
    fn test_filename_falls_back_to_url_tail() {
        let a = ReleaseAsset {
            url: "https://example.test/files/croupier-2.0.4.zip".to_string(),
            filename: String::new(),
            size: None,
            sha256: None,
        };
        let entry = UpdateEntry {
            guid: "com.turbodestroyer.croupier".to_string(),
            name: Some("Croupier".to_string()),
            current_version: Some("2.0.3".to_string()),
            latest_version: Some("2.0.4".to_string()),
            assets: Vec::new(),
        };
        assert_eq!(filename_for(&a, &entry), "croupier-2.0.4.zip");
    }
}
