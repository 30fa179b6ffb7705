use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{Level, info, instrument};

use crate::errors::Error;

/// Name of the env var for a base-directory override ("portable" mode), mirroring
/// the pattern the rest of the search-path stack already uses.
const ENV_BASE_DIR: &str = "KILN_BASE_DIR";

/// One candidate root under the search-path rule of §6: a directory that may
/// contain `config.lua`, `scripts/`, `actions/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub dir: PathBuf,
}

impl SearchRoot {
    pub fn config_file(&self) -> PathBuf {
        self.dir.join("config.lua")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.dir.join("scripts")
    }

    pub fn actions_dir(&self) -> PathBuf {
        self.dir.join("actions")
    }

    fn has_config(&self) -> bool {
        self.config_file().is_file()
    }
}

/// User-config directory followed by the fixed list of system data directories,
/// in priority order. First match wins (§6 "Search paths").
#[instrument(level = Level::DEBUG, err)]
pub fn search_roots() -> Result<Vec<SearchRoot>, Error> {
    if let Ok(base) = env::var(ENV_BASE_DIR) {
        info!("using portable base dir override");
        let base = PathBuf::from(base);
        return Ok(vec![SearchRoot { dir: base }]);
    }

    let proj = ProjectDirs::from("org", "kiln", "kiln").ok_or(Error::NoHome)?;
    let mut roots = vec![SearchRoot {
        dir: proj.config_dir().to_path_buf(),
    }];
    roots.extend(system_data_dirs().into_iter().map(|dir| SearchRoot { dir }));
    Ok(roots)
}

#[cfg(unix)]
fn system_data_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc/kiln"),
        PathBuf::from("/usr/local/share/kiln"),
        PathBuf::from("/usr/share/kiln"),
    ]
}

#[cfg(windows)]
fn system_data_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("C:\\ProgramData\\kiln")]
}

/// Picks the first root (in search order) whose `config.lua` exists.
pub fn resolve_config(roots: &[SearchRoot]) -> Result<&SearchRoot, Error> {
    roots
        .iter()
        .find(|root| root.has_config())
        .ok_or(Error::NoConfigFound)
}

/// Used by tests to build a deterministic, isolated search path.
pub fn single_root(dir: impl AsRef<Path>) -> SearchRoot {
    SearchRoot {
        dir: dir.as_ref().to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_root_with_config_wins() {
        let tmp1 = tempfile::tempdir().unwrap();
        let tmp2 = tempfile::tempdir().unwrap();
        std::fs::write(tmp2.path().join("config.lua"), "cores = 4\n").unwrap();

        let roots = vec![single_root(tmp1.path()), single_root(tmp2.path())];
        let chosen = resolve_config(&roots).unwrap();
        assert_eq!(chosen.dir, tmp2.path());
    }

    #[test]
    fn no_config_anywhere_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = vec![single_root(tmp.path())];
        assert!(resolve_config(&roots).is_err());
    }
}
