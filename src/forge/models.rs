use serde::{Deserialize, Serialize};

/// Mod owner as reported by the portal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForgeOwner {
    pub name: String,
}

/// One downloadable file attached to a release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReleaseAsset {
    pub url: String,
    #[serde(alias = "name")]
    pub filename: String,
    pub size: Option<u64>,
    pub sha256: Option<String>,
}

/// A published release of a mod
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ForgeRelease {
    pub version: Option<String>,
    #[serde(default, alias = "files")]
    pub assets: Vec<ReleaseAsset>,
}

/// A catalog entry. Owned by the portal; read-only on this side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForgeMod {
    pub id: u64,
    pub guid: String,
    pub slug: String,
    pub name: String,
    pub owner: Option<ForgeOwner>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub teaser: Option<String>,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default, alias = "files")]
    pub releases: Vec<ForgeRelease>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ForgeMod {
    /// Concatenated identity text used by the matcher's version-boost check.
    pub fn identity_text(&self) -> String {
        format!("{}{}{}", self.name, self.slug, self.guid)
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.name.as_str())
    }
}

/// One update row from the portal's update-status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateEntry {
    pub guid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "installed_version")]
    pub current_version: Option<String>,
    #[serde(default, alias = "version")]
    pub latest_version: Option<String>,
    #[serde(default, alias = "files")]
    pub assets: Vec<ReleaseAsset>,
}

/// Update status for a batch of guid:version pairs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpdateReport {
    #[serde(default)]
    pub updates: Vec<UpdateEntry>,
    #[serde(default, alias = "blocked_updates")]
    pub blocked: Vec<UpdateEntry>,
    #[serde(default, alias = "incompatible_with_spt")]
    pub incompatible: Vec<UpdateEntry>,
    #[serde(default)]
    pub up_to_date: Vec<UpdateEntry>,
}

/// Portal response envelope: `{ success, data }`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
}
