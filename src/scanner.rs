//! Install-root scanning: list staged install folders and walk their
//! contents within explicit depth/count bounds.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Bounds for a recursive file walk. Staged mod folders occasionally contain
/// unpacked game assets; the caps keep a pass from drowning in them.
#[derive(Debug, Clone, Copy)]
pub struct WalkLimits {
    pub max_depth: usize,
    pub max_files: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        WalkLimits {
            max_depth: 6,
            max_files: 200,
        }
    }
}

/// List immediate subdirectory names of the install root. Unreadable entries
/// are skipped; a missing root yields an empty list.
pub fn list_install_dirs(root: &Path) -> Vec<String> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read install root {:?}: {}", root, e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .collect();
    dirs.sort();
    dirs
}

/// Recursively collect files under `root` that pass `filter`, respecting the
/// walk limits. Unreadable directories are skipped silently; extraction is
/// best-effort throughout.
pub fn walk_files(root: &Path, limits: WalkLimits, filter: &dyn Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_recursive(root, 0, limits, filter, &mut out);
    debug!("Walk of {:?} found {} file(s)", root, out.len());
    out
}

fn walk_recursive(
    dir: &Path,
    depth: usize,
    limits: WalkLimits,
    filter: &dyn Fn(&Path) -> bool,
    out: &mut Vec<PathBuf>,
) {
    if depth > limits.max_depth || out.len() >= limits.max_files {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        if out.len() >= limits.max_files {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            walk_recursive(&path, depth + 1, limits, filter, out);
        } else if path.is_file() && filter(&path) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_walk_respects_depth_limit() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let deep = tmp.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).expect("mkdirs");
        File::create(tmp.path().join("top.dll")).expect("create");
        File::create(deep.join("deep.dll")).expect("create");

        let limits = WalkLimits {
            max_depth: 1,
            max_files: 100,
        };
        let found = walk_files(tmp.path(), limits, &|p| {
            p.extension().and_then(|e| e.to_str()) == Some("dll")
        });
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("top.dll"));
    }

    #[test]
    fn test_walk_respects_file_cap() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for i in 0..10 {
            File::create(tmp.path().join(format!("f{}.dll", i))).expect("create");
        }
        let limits = WalkLimits {
            max_depth: 2,
            max_files: 3,
        };
        let found = walk_files(tmp.path(), limits, &|_| true);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_list_install_dirs_missing_root() {
        assert!(list_install_dirs(Path::new("/nonexistent/forge-sync-test")).is_empty());
    }
}
