//! Model and dictionary root discovery.
//!
//! The root is resolved once at backend construction: each entry of the
//! environment search path is probed for the conventional subpath, first
//! existing match wins, with one fixed fallback. When nothing matches the
//! backend holds no root and reports `ResourceMissing` on first use instead
//! of failing at load time.

use std::path::PathBuf;

use tracing::debug;

use crate::core::constants::{DATA_DIRS_ENV, DEFAULT_MODEL_ROOT, MODEL_SUBPATH};

/// Resolves the model root from the process environment.
pub fn resolve_model_root() -> Option<PathBuf> {
    let root = search(std::env::var(DATA_DIRS_ENV).ok().as_deref());
    match &root {
        Some(path) => debug!("model root resolved to {}", path.display()),
        None => debug!("no model root found"),
    }
    root
}

/// Probes a colon-separated search path, then the fixed fallback.
fn search(data_dirs: Option<&str>) -> Option<PathBuf> {
    if let Some(dirs) = data_dirs {
        for entry in dirs.split(':').filter(|e| !e.is_empty()) {
            let candidate = PathBuf::from(entry).join(MODEL_SUBPATH);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
    }

    let fallback = PathBuf::from(DEFAULT_MODEL_ROOT);
    fallback.is_dir().then_some(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_entry_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(second.path().join(MODEL_SUBPATH)).unwrap();

        let dirs = format!("{}:{}", first.path().display(), second.path().display());
        let found = search(Some(&dirs)).unwrap();
        assert_eq!(found, second.path().join(MODEL_SUBPATH));
    }

    #[test]
    fn earlier_entries_shadow_later_ones() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(first.path().join(MODEL_SUBPATH)).unwrap();
        std::fs::create_dir_all(second.path().join(MODEL_SUBPATH)).unwrap();

        let dirs = format!("{}:{}", first.path().display(), second.path().display());
        let found = search(Some(&dirs)).unwrap();
        assert_eq!(found, first.path().join(MODEL_SUBPATH));
    }

    #[test]
    fn no_match_and_no_fallback_is_none() {
        let empty = tempfile::tempdir().unwrap();
        let dirs = format!("{}", empty.path().display());
        // The fixed fallback is absent on test machines.
        assert_eq!(search(Some(&dirs)), None);
        assert_eq!(search(None), None);
    }
}
