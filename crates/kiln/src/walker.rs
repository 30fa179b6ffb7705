use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Spawns the single Walker worker (§2, §4.2): enumerates every root with
/// `walkdir`, filters by extension, canonicalizes, and drops anything whose
/// canonical path has already been seen — the source of the "each input
/// processed at most once" invariant (§8).
pub fn spawn_walker(roots: Vec<PathBuf>, extensions: HashSet<String>) -> mpsc::Receiver<PathBuf> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut seen = HashSet::new();
        for root in roots {
            walk_one_root(&root, &extensions, &mut seen, &tx).await;
        }
    });

    rx
}

async fn walk_one_root(
    root: &Path,
    extensions: &HashSet<String>,
    seen: &mut HashSet<PathBuf>,
    tx: &mpsc::Sender<PathBuf>,
) {
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let has_allowed_extension = path
            .extension()
            .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false);
        if !has_allowed_extension {
            debug!(path = %path.display(), "extension not in the configured set, skipping");
            continue;
        }

        let canonical = match dunce::canonicalize(path) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not canonicalize path, skipping");
                continue;
            }
        };

        if !seen.insert(canonical.clone()) {
            debug!(path = %canonical.display(), "duplicate canonical path, skipping");
            continue;
        }

        if tx.send(canonical).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_by_extension_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.flac"), b"").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();

        let mut extensions = HashSet::new();
        extensions.insert("flac".to_string());

        let mut rx = spawn_walker(vec![dir.path().to_path_buf(), dir.path().to_path_buf()], extensions);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.file_name().unwrap(), "a.flac");
        assert!(rx.recv().await.is_none());
    }
}
