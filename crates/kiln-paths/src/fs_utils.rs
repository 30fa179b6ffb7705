use std::fs::{self, OpenOptions};
use std::path::Path;

use fs2::FileExt;
use tracing::instrument;

use crate::errors::Error;

#[instrument(level = "trace", err)]
pub fn ensure_dir(path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Acquires an exclusive advisory lock on `path`, creating it first if needed.
/// Keep the returned `File` alive to hold the lock.
#[instrument(level = "trace", err)]
pub fn lock_file(path: &Path) -> Result<std::fs::File, Error> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}
