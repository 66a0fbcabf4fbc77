// Library exports for integration tests and reusable components

pub mod acquire;
pub mod config;
pub mod download;
pub mod enrich;
pub mod evidence;
pub mod forge;
pub mod heuristics;
pub mod mapping;
pub mod matcher;
pub mod scanner;
pub mod similarity;

// Test support (only available with test-utils feature)
#[cfg(feature = "test-utils")]
pub mod test_support;
