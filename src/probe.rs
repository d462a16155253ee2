//! CLI presence probe
//!
//! Answers whether the session program is installed. Purely informational:
//! `ProcessSession::start` does not consult it.

use std::env;
use std::path::{Path, PathBuf};

/// Locate `program` on this host
///
/// Explicit paths are checked as given. Bare names are looked up in `PATH`
/// and then in the usual per-user install locations.
#[must_use]
pub fn find_cli(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    if let Ok(path) = which::which(program) {
        return Some(path);
    }

    let home = env::var("HOME").ok().map(PathBuf::from)?;
    [
        home.join(".npm-global/bin"),
        PathBuf::from("/usr/local/bin"),
        home.join(".local/bin"),
        home.join("node_modules/.bin"),
        home.join(".yarn/bin"),
        home.join(".bun/bin"),
    ]
    .into_iter()
    .map(|dir| dir.join(program))
    .find(|path| path.is_file())
}

/// Whether `program` is installed
#[must_use]
pub fn cli_available(program: &str) -> bool {
    let found = find_cli(program);
    log::debug!("CLI probe for '{program}': {found:?}");
    found.is_some()
}
