use std::path::{Path, PathBuf};

use kiln_core::{InputInfo, OutputInfo, TrackStatus, WriteDisposition};
use kiln_probe::{LogLevel, Transcoder, TranscodeRequest};

use crate::cover::{self, CoverDedupSet, CoverTransfer};
use crate::decide::{decide, needs_transcode, Action, DecisionInput};
use crate::error::TransformError;
use crate::tags::{requires_transcode_for_tags, write_fast_path};

/// Rewrites `destination` to a `.1`, `.2`, … sibling that does not already
/// exist, preserving the extension (§4.6 "Exist, write=suffix").
pub fn suffixed_sibling(destination: &Path) -> PathBuf {
    let stem = destination.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let ext = destination.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = destination.parent().unwrap_or_else(|| Path::new(""));

    for n in 1u32.. {
        let name = match &ext {
            Some(ext) => format!("{stem}.{n}.{ext}"),
            None => format!("{stem}.{n}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("suffix search space is unbounded")
}

/// Renames `src` to `dst`, falling back to a byte copy plus source delete
/// when the rename fails (typically a cross-device move), per §4.6.
async fn rename_or_copy(src: &Path, dst: &Path, removesource: bool) -> Result<(), TransformError> {
    if tokio::fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(src, dst).await?;
    if removesource {
        tokio::fs::remove_file(src).await?;
    }
    Ok(())
}

/// Materializes one track (§4.6 state machine): runs the decision table, then
/// executes the chosen action against the filesystem and the transcoder.
pub async fn materialize_track(
    transcoder: &Transcoder,
    cover_dedup: &CoverDedupSet,
    input: &InputInfo,
    output: &mut OutputInfo,
    status: TrackStatus,
    multi_track: bool,
) -> Result<(), TransformError> {
    let canonical_input = input.canonical_path.clone();
    let in_place = tokio::fs::canonicalize(&output.destination)
        .await
        .map(|p| p == canonical_input)
        .unwrap_or(false);

    if status == TrackStatus::Exist && output.write == WriteDisposition::Suffix {
        output.destination = suffixed_sibling(&output.destination);
    }

    let transcode_needed = needs_transcode(
        multi_track,
        &guess_container(&canonical_input),
        &output.container,
        &output.params,
        requires_transcode_for_tags(&input.tags, &output.tags),
    );

    let action = decide(DecisionInput {
        status,
        write: output.write,
        in_place,
        removesource: output.removesource,
        needs_transcode: transcode_needed,
    });

    match action {
        Action::Skip => {}
        Action::DeleteInput => {
            tokio::fs::remove_file(&canonical_input).await?;
        }
        Action::Transcode => {
            run_transcode(transcoder, &canonical_input, output, in_place).await?;
        }
        Action::CopyOrRenameWithTagWrite => {
            if !in_place {
                rename_or_copy(&canonical_input, &output.destination, output.removesource).await?;
            }
            write_fast_path(&output.destination, &output.tags)?;
        }
    }

    let multi_cover = output.covers.len() > 1;
    for (index, cover) in output.covers.iter().enumerate() {
        let bytes = resolve_cover_bytes(input, cover);
        if let Some(bytes) = bytes {
            let destination = cover_destination(output, cover, index, multi_cover);
            cover::transfer(
                cover_dedup,
                transcoder,
                CoverTransfer {
                    destination: &destination,
                    bytes: &bytes,
                    format: &cover.format,
                    transcode_params: &cover.params,
                },
            )
            .await?;
        }
    }

    Ok(())
}

async fn run_transcode(
    transcoder: &Transcoder,
    canonical_input: &Path,
    output: &mut OutputInfo,
    in_place: bool,
) -> Result<(), TransformError> {
    let final_destination = output.destination.clone();
    let working_destination = if in_place {
        temp_sibling(&final_destination)
    } else {
        final_destination.clone()
    };

    let request = TranscodeRequest {
        src: canonical_input.to_path_buf(),
        dst: working_destination.clone(),
        container: output.container.clone(),
        params: output.params.clone(),
        start: None,
        duration: None,
        exclude_video: true,
        excluded_stream_indices: Vec::new(),
        tags: output.tags.clone(),
        log_level: LogLevel::Warning,
    };
    transcoder.run(&request).await?;

    if in_place {
        tokio::fs::rename(&working_destination, &final_destination).await?;
    }

    Ok(())
}

fn temp_sibling(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".kiln-tmp");
    destination.with_file_name(name)
}

fn guess_container(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

/// Names one cover's destination after its own format, so covers with
/// distinct checksums never collapse onto the same file (§4.6, §8 scenario 6
/// keys dedup on `(destination, partial-checksum)` pairs). Indexed when a
/// track requests more than one cover.
fn cover_destination(output: &OutputInfo, cover: &kiln_core::OutputCover, index: usize, multi_cover: bool) -> PathBuf {
    let dir = output.destination.parent().unwrap_or(Path::new("."));
    let ext = if cover.format.is_empty() { "jpg".to_string() } else { cover.format.to_lowercase() };
    let name = if multi_cover { format!("cover-{index}.{ext}") } else { format!("cover.{ext}") };
    dir.join(name)
}

fn resolve_cover_bytes(input: &InputInfo, cover: &kiln_core::OutputCover) -> Option<Vec<u8>> {
    match &cover.source {
        kiln_core::CoverSource::External(filename) => {
            let dir = input.canonical_path.parent()?;
            std::fs::read(dir.join(filename)).ok()
        }
        kiln_core::CoverSource::Embedded(_) | kiln_core::CoverSource::Online => {
            input.cover_bytes(&cover.source).map(|bytes| bytes.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixed_sibling_avoids_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("track.flac");
        std::fs::write(dir.path().join("track.1.flac"), b"x").unwrap();

        let next = suffixed_sibling(&dst);
        assert_eq!(next, dir.path().join("track.2.flac"));
    }

    #[test]
    fn temp_sibling_keeps_original_extension_visible() {
        let dst = PathBuf::from("/music/track.flac");
        let tmp = temp_sibling(&dst);
        assert_eq!(tmp, PathBuf::from("/music/track.flac.kiln-tmp"));
    }
}
