pub mod client;
pub mod models;

pub use client::{CatalogClient, ForgeClient, ForgeError};
pub use models::{ForgeMod, ForgeOwner, ForgeRelease, ReleaseAsset, UpdateEntry, UpdateReport};
