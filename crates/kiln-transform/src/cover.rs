use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kiln_core::COVER_CHECKSUM_PREFIX_BYTES;
use kiln_probe::Transcoder;
use sha2::{Digest, Sha256};

use crate::error::TransformError;

/// Partial checksum over the first `COVER_CHECKSUM_PREFIX_BYTES` of `bytes`,
/// matching `kiln-core::CoverDescriptor`'s identity rule (§3): two covers are
/// the same iff this value matches.
pub fn partial_checksum(bytes: &[u8]) -> String {
    let prefix = &bytes[..bytes.len().min(COVER_CHECKSUM_PREFIX_BYTES)];
    let digest = Sha256::digest(prefix);
    hex::encode(digest)
}

/// Process-wide dedup set for cover transfers (§4.6): a (canonical
/// destination, partial checksum) pair that has already been written once is
/// never written again, even from a different source file.
#[derive(Default)]
pub struct CoverDedupSet {
    seen: Mutex<HashSet<(PathBuf, String)>>,
}

impl CoverDedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this is the first time `(destination, checksum)` has
    /// been observed — the caller should proceed with the write. Subsequent
    /// calls with the same pair return `false`.
    fn claim(&self, destination: &Path, checksum: &str) -> bool {
        let mut seen = self.seen.lock().expect("cover dedup mutex poisoned");
        seen.insert((destination.to_path_buf(), checksum.to_string()))
    }
}

/// One requested cover transfer, resolved down to bytes plus an optional
/// transcode recipe (§4.6).
pub struct CoverTransfer<'a> {
    pub destination: &'a Path,
    pub bytes: &'a [u8],
    pub format: &'a str,
    pub transcode_params: &'a [String],
}

/// Executes one cover transfer, applying the dedup set and the
/// already-identical-destination check (§4.6 "Cover transfer"). A no-op
/// (skip) is not an error.
pub async fn transfer(
    dedup: &CoverDedupSet,
    transcoder: &Transcoder,
    transfer: CoverTransfer<'_>,
) -> Result<(), TransformError> {
    let checksum = partial_checksum(transfer.bytes);

    if !dedup.claim(transfer.destination, &checksum) {
        return Ok(());
    }

    if let Ok(existing) = std::fs::read(transfer.destination) {
        if partial_checksum(&existing) == checksum {
            return Ok(());
        }
    }

    if transfer.transcode_params.is_empty() {
        std::fs::write(transfer.destination, transfer.bytes)?;
    } else {
        transcoder
            .write_cover(transfer.bytes, transfer.format, transfer.transcode_params, transfer.destination)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_destination_and_checksum_claims_once() {
        let dedup = CoverDedupSet::new();
        let dest = PathBuf::from("/music/cover.jpg");
        assert!(dedup.claim(&dest, "abc"));
        assert!(!dedup.claim(&dest, "abc"));
        assert!(dedup.claim(&dest, "def"));
    }

    #[test]
    fn partial_checksum_only_hashes_prefix() {
        let small = vec![1u8; 10];
        let mut large = vec![1u8; COVER_CHECKSUM_PREFIX_BYTES];
        large.extend_from_slice(&[9u8; 1024]);
        assert_ne!(partial_checksum(&small), partial_checksum(&large));

        let mut a = vec![2u8; COVER_CHECKSUM_PREFIX_BYTES];
        let mut b = a.clone();
        a.extend_from_slice(&[1, 2, 3]);
        b.extend_from_slice(&[9, 9, 9]);
        assert_eq!(partial_checksum(&a), partial_checksum(&b));
    }
}
