use std::path::{Path, PathBuf};

use anyhow::Context;
use kiln_core::TrackRecord;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

/// Maximum size this implementation will round-trip through `read` (§6
/// "Index file"). Appending via `append` is unbounded by this check; it only
/// guards the read-back path used for tag-edit round-trips.
pub const MAX_INDEX_BYTES: u64 = 10 * 1024 * 1024;

/// Appends one file's resolved tracks to the index file as a fragment of the
/// form `"<input-path>": [<output-track>, …],` (§6). The file is not valid
/// JSON on its own; `read` wraps it before parsing.
pub async fn append(index_path: &Path, input_path: &Path, tracks: &[TrackRecord]) -> anyhow::Result<()> {
    let outputs: Vec<&kiln_core::OutputInfo> = tracks.iter().map(|t| &t.output).collect();
    let input_path_string = input_path.to_string_lossy().into_owned();
    let fragment = format!(
        "{}: {},\n",
        serde_json::to_string(&input_path_string)?,
        serde_json::to_string(&outputs)?
    );

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(index_path)
        .await
        .with_context(|| format!("opening index file {}", index_path.display()))?;
    file.write_all(fragment.as_bytes()).await?;
    Ok(())
}

/// Reads the index file back as a map of input path to its output tracks,
/// per §6: wrap the concatenated fragments with `{…"":null}` and parse as one
/// JSON object, then drop the trailing sentinel key.
pub async fn read(index_path: &Path) -> anyhow::Result<std::collections::HashMap<PathBuf, Value>> {
    let metadata = tokio::fs::metadata(index_path)
        .await
        .with_context(|| format!("reading index file {}", index_path.display()))?;
    if metadata.len() > MAX_INDEX_BYTES {
        anyhow::bail!("index file {} exceeds the {} byte limit", index_path.display(), MAX_INDEX_BYTES);
    }

    let body = tokio::fs::read_to_string(index_path).await?;
    let wrapped = format!("{{{body}\"\":null}}");
    let mut parsed: std::collections::HashMap<String, Value> = serde_json::from_str(&wrapped)
        .with_context(|| format!("parsing index file {}", index_path.display()))?;
    parsed.remove("");

    Ok(parsed.into_iter().map(|(k, v)| (PathBuf::from(k), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{OutputInfo, TrackStatus, WriteDisposition};

    fn sample_track() -> TrackRecord {
        TrackRecord {
            output: OutputInfo {
                destination: PathBuf::from("/music/out.flac"),
                container: "flac".to_string(),
                params: vec!["-c:a".to_string(), "copy".to_string()],
                tags: kiln_core::TagMap::new(),
                covers: Vec::new(),
                write: WriteDisposition::Suffix,
                removesource: false,
            },
            status: TrackStatus::Ok,
        }
    }

    #[tokio::test]
    async fn append_then_read_round_trips_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.json");

        append(&index_path, Path::new("/music/a.flac"), &[sample_track()]).await.unwrap();
        append(&index_path, Path::new("/music/b.flac"), &[sample_track()]).await.unwrap();

        let parsed = read(&index_path).await.unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains_key(&PathBuf::from("/music/a.flac")));
        assert!(parsed.contains_key(&PathBuf::from("/music/b.flac")));
    }
}
