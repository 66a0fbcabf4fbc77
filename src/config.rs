use crate::matcher::GenericGuidRules;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FORGE_API_KEY is not set; create an API key on the portal and export it")]
    MissingApiKey,
}

/// Application configuration
/// Loads from environment variables; in debug builds a .env file is read
/// first so development keys stay out of the shell profile.
#[derive(Clone, Debug)]
pub struct Config {
    /// Portal API key. Always explicit, never baked in.
    pub api_key: String,
    /// Portal base URL, overridable for self-hosted instances and tests
    pub base_url: String,
    /// Game version reported to the update endpoint
    pub spt_version: Option<String>,
    /// Root directory containing one subdirectory per installed mod
    pub install_root: PathBuf,
    /// Curated override table location
    pub mapping_path: PathBuf,
    /// Where verified archives end up
    pub downloads_dir: PathBuf,
    /// Identifier deny-list for direct guid lookups
    pub guid_rules: GenericGuidRules,
}

pub const DEFAULT_BASE_URL: &str = "https://forge.sp-tarkov.com";
const MAPPING_FILE: &str = "spt_check_mapping.json";

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        if dotenvy::dotenv().is_ok() {
            tracing::debug!("Loaded .env file");
        }

        Self::from_env()
    }

    fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("FORGE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let base_url = std::env::var("FORGE_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let spt_version = std::env::var("FORGE_SPT_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let install_root = std::env::var("FORGE_INSTALL_ROOT")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let mapping_path = std::env::var("FORGE_MAPPING_PATH")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| install_root.join(MAPPING_FILE));

        let downloads_dir = std::env::var("FORGE_DOWNLOADS_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_downloads_dir());

        let mut guid_rules = GenericGuidRules::default();
        if let Ok(extra) = std::env::var("FORGE_GENERIC_GUID_PREFIXES") {
            for prefix in extra.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                guid_rules.segment_prefixes.push(prefix.to_ascii_lowercase());
            }
        }

        Ok(Self {
            api_key,
            base_url,
            spt_version,
            install_root,
            mapping_path,
            downloads_dir,
            guid_rules,
        })
    }
}

fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("forge-sync")
}
