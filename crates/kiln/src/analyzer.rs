use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_core::{
    AlbumKey, CoverDescriptor, CoverSource, CueSheet, FileRecord, InputInfo, OutputInfo, TagMap,
    TrackRecord, TrackStatus,
};
use kiln_pipeline::{Stage, StageWorker};
use kiln_probe::{cuesheet, FingerprintTool, Prober, Transcoder};
use kiln_resolver::{stringnorm, stringrel, AlbumContext, LocalTrack, Resolver};
use kiln_sandbox::{Sandbox, ScriptSource};
use serde_json::Value;

const IMAGE_LIKE_CODECS: &[&str] = &["mjpeg", "png", "bmp", "gif"];
const SIBLING_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// The prescript/scripts/postscript ordering from the configuration file
/// (§6), flattened once per analyzer run rather than re-read per track.
#[derive(Clone, Default)]
pub struct ScriptChain {
    pub prescript: Option<ScriptSource>,
    pub scripts: Vec<ScriptSource>,
    pub postscript: Option<ScriptSource>,
}

impl ScriptChain {
    fn ordered(&self) -> Vec<ScriptSource> {
        let mut all = Vec::new();
        all.extend(self.prescript.clone());
        all.extend(self.scripts.clone());
        all.extend(self.postscript.clone());
        all
    }
}

/// The Analyzer stage (§4.5): turns a walked `PathBuf` into a fully resolved
/// `FileRecord`, one script-chain run per cue-sheet track.
pub struct AnalyzerStage {
    pub worker_count: usize,
    pub prober: Arc<Prober>,
    pub transcoder: Arc<Transcoder>,
    pub fingerprinter: Arc<FingerprintTool>,
    pub resolver: Arc<Resolver>,
    pub sandbox: Arc<Sandbox>,
    pub chain: Arc<ScriptChain>,
    pub exist_action: Arc<Option<ScriptSource>>,
    pub online: bool,
}

impl Stage for AnalyzerStage {
    type Input = PathBuf;
    type Output = FileRecord;
    type Worker = AnalyzerWorker;

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn spawn_worker(&self) -> AnalyzerWorker {
        AnalyzerWorker {
            prober: self.prober.clone(),
            transcoder: self.transcoder.clone(),
            fingerprinter: self.fingerprinter.clone(),
            resolver: self.resolver.clone(),
            sandbox: self.sandbox.clone(),
            chain: self.chain.clone(),
            exist_action: self.exist_action.clone(),
            online: self.online,
        }
    }
}

pub struct AnalyzerWorker {
    prober: Arc<Prober>,
    transcoder: Arc<Transcoder>,
    fingerprinter: Arc<FingerprintTool>,
    resolver: Arc<Resolver>,
    sandbox: Arc<Sandbox>,
    chain: Arc<ScriptChain>,
    exist_action: Arc<Option<ScriptSource>>,
    online: bool,
}

impl StageWorker for AnalyzerWorker {
    type Input = PathBuf;
    type Output = FileRecord;

    async fn run(&mut self, path: PathBuf) -> FileRecord {
        match self.analyze(&path).await {
            Ok(record) => record,
            Err(reason) => rejected_record(&path, reason),
        }
    }
}

impl AnalyzerWorker {
    async fn analyze(&self, path: &Path) -> Result<FileRecord, String> {
        // Step 1: probe, locate first audio stream.
        let probe_result = self.prober.probe(path).await;
        let probe = probe_result.map_err(|source| format!("probe failed: {source}"))?;

        let Some(first_audio_stream_index) = probe.first_audio_stream_index() else {
            return Err("no audio stream present".to_string());
        };

        let modified_unix = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        // Step 2: tag map overlay, format < stream.
        let mut base_tags = TagMap::new();
        base_tags.overlay(&tags_from_value(&probe.format));
        if let Some(stream) = probe.streams.get(first_audio_stream_index) {
            base_tags.overlay(&tags_from_value(stream));
        }

        // Step 3: adjacent cue-sheet.
        let mut warnings = Vec::new();
        let cue_sheet = find_cue_sheet(path, &mut warnings).await;
        let cue_file = cue_sheet.as_ref().and_then(|sheet| select_cue_file(sheet, path));
        let track_count = cue_file.map(|f| f.tracks.len()).unwrap_or(1).max(1);

        // Step 4: embedded covers.
        let mut covers = Vec::new();
        let mut cover_bytes = Vec::new();
        let (embedded_covers, embedded_bytes) = self.probe_embedded_covers(path, &probe.streams).await;
        covers.extend(embedded_covers);
        cover_bytes.extend(embedded_bytes);

        // Step 5: sibling image files.
        covers.extend(probe_sibling_covers(path).await);

        // Step 6: online resolution for single-track files.
        let online_tags = if track_count == 1 && self.online {
            match self.resolve_online(path, &base_tags).await {
                Some(resolution) => {
                    if let Some(bytes) = resolution.cover {
                        covers.push(CoverDescriptor {
                            source: CoverSource::Online,
                            format: "jpg".to_string(),
                            width: 0,
                            height: 0,
                            partial_checksum: kiln_transform::cover::partial_checksum(&bytes),
                        });
                        cover_bytes.push((CoverSource::Online, bytes));
                    }
                    resolution.tags
                }
                None => TagMap::new(),
            }
        } else {
            TagMap::new()
        };

        let input_info = InputInfo {
            canonical_path: path.to_path_buf(),
            bitrate_bps: probe.bitrate_bps(),
            tags: base_tags.clone(),
            modified_unix,
            covers,
            cover_bytes,
            first_audio_stream_index,
            format: probe.format.clone(),
            streams: probe.streams.clone(),
            cue_sheet: cue_sheet.clone(),
            track_count,
        };

        let container = guess_container(path);
        let mut tracks = Vec::new();
        let mut track_logs: Vec<String> = warnings;

        for track_index in 0..track_count {
            let mut track_tags = base_tags.clone();
            if let Some(sheet) = &cue_sheet {
                track_tags.overlay(&sheet.header);
            }
            if let Some(file) = cue_file {
                if let Some(track) = file.tracks.get(track_index) {
                    track_tags.overlay(&track.tags);
                }
            }
            if track_count == 1 {
                track_tags.overlay(&online_tags);
            }

            let mut output = OutputInfo::from_input(&input_info, &container);
            output.tags.overlay(&track_tags);

            let mut log = Vec::new();
            let chain = self.chain.ordered();
            output = match self.sandbox.run_chain(&chain, &track_tags, output.clone(), &mut log) {
                Ok(out) => out,
                Err(source) => {
                    log.push(format!("script chain failed: {source}"));
                    output
                }
            };

            if output.destination.file_name().is_none() {
                output.destination = input_info.canonical_path.clone();
            }
            if output.destination.is_relative() {
                let base = input_info.canonical_path.parent().unwrap_or_else(|| Path::new("."));
                output.destination = base.join(&output.destination);
            }

            let destination_exists = tokio::fs::try_exists(&output.destination).await.unwrap_or(false);
            let status = if destination_exists {
                let existinfo_tags = match self.prober.probe(&output.destination).await {
                    Ok(existing) => tags_from_value(&existing.format),
                    Err(_) => TagMap::new(),
                };
                output = match self.sandbox.run_exist_action(
                    self.exist_action.as_ref().as_ref(),
                    &existinfo_tags,
                    output.clone(),
                    &mut log,
                ) {
                    Ok(out) => out,
                    Err(source) => {
                        log.push(format!("exist action failed: {source}"));
                        output
                    }
                };
                TrackStatus::Exist
            } else {
                TrackStatus::Ok
            };

            track_logs.extend(log);
            tracks.push(TrackRecord { output, status });
        }

        let mut record = FileRecord::new(input_info);
        record.tracks = tracks;
        for line in track_logs {
            record.log_line(line);
        }
        Ok(record)
    }

    async fn probe_embedded_covers(
        &self,
        path: &Path,
        streams: &Value,
    ) -> (Vec<CoverDescriptor>, Vec<(CoverSource, Vec<u8>)>) {
        let mut covers = Vec::new();
        let mut bytes_by_source = Vec::new();
        let Some(streams) = streams.as_array() else {
            return (covers, bytes_by_source);
        };

        for (index, stream) in streams.iter().enumerate() {
            let is_video = stream.get("codec_type").and_then(Value::as_str) == Some("video");
            if !is_video {
                continue;
            }
            let codec_name = stream.get("codec_name").and_then(Value::as_str).unwrap_or_default();
            if !IMAGE_LIKE_CODECS.contains(&codec_name) {
                continue;
            }

            let temp_path = std::env::temp_dir().join(format!(
                "kiln-cover-{}-{}-{index}.{}",
                std::process::id(),
                path_hash(path),
                codec_extension(codec_name)
            ));
            let extract_result = self.transcoder.extract_stream(path, index, &temp_path).await;
            if extract_result.is_err() {
                continue;
            }
            let read_result = tokio::fs::read(&temp_path).await;
            let _ = tokio::fs::remove_file(&temp_path).await;
            let Ok(bytes) = read_result else { continue };

            let width = stream.get("width").and_then(Value::as_u64).unwrap_or(0) as u32;
            let height = stream.get("height").and_then(Value::as_u64).unwrap_or(0) as u32;

            covers.push(CoverDescriptor {
                source: CoverSource::Embedded(index),
                format: codec_name.to_string(),
                width,
                height,
                partial_checksum: kiln_transform::cover::partial_checksum(&bytes),
            });
            bytes_by_source.push((CoverSource::Embedded(index), bytes));
        }

        (covers, bytes_by_source)
    }

    async fn resolve_online(&self, path: &Path, tags: &TagMap) -> Option<OnlineResolution> {
        let fingerprint = self.fingerprinter.fingerprint(path).await.ok()?;

        let local = LocalTrack {
            title: tags.get("title").unwrap_or_default().to_string(),
            artist: tags.get("artist").unwrap_or_default().to_string(),
            album_artist: tags.get("album_artist").unwrap_or_default().to_string(),
            album: tags.get("album").unwrap_or_default().to_string(),
            disc_number: tags.get("disc").and_then(|v| v.parse().ok()),
            track_number: tags.get("track").and_then(|v| v.parse().ok()),
            track_count: tags.get("track_count").and_then(|v| v.parse().ok()),
            year: tags.get("date").and_then(|v| v.get(0..4)).and_then(|v| v.parse().ok()),
            duration_secs: Some(fingerprint.duration_secs as f64),
        };

        let album = tags.get("album").filter(|a| !a.is_empty()).map(str::to_string).unwrap_or_else(|| {
            path.parent()
                .and_then(|p| p.file_name())
                .map(|n| stringnorm(&n.to_string_lossy()))
                .unwrap_or_default()
        });
        let key = AlbumKey::new(album, local.album_artist.clone(), tags.get("date").unwrap_or_default());

        let ctx = AlbumContext {
            fingerprint: fingerprint.fingerprint,
            duration_secs: fingerprint.duration_secs,
            local,
        };

        let release_id = self.resolver.resolve_release_id(&key, &ctx).await;
        if release_id.is_unknown() {
            return None;
        }

        let tags = self.resolver.get_tags(&release_id).await.ok()?;
        let cover = self.resolver.get_cover(&release_id).await.ok().and_then(|bytes| {
            if bytes.is_empty() {
                None
            } else {
                Some(bytes.as_ref().clone())
            }
        });

        Some(OnlineResolution { tags, cover })
    }
}

/// The online resolver's step-6 result: resolved tags, plus cover bytes when
/// the cover-archive lookup (or release-page fallback) found one.
struct OnlineResolution {
    tags: TagMap,
    cover: Option<Vec<u8>>,
}

fn rejected_record(path: &Path, reason: String) -> FileRecord {
    let input = InputInfo {
        canonical_path: path.to_path_buf(),
        bitrate_bps: 0,
        tags: TagMap::new(),
        modified_unix: 0,
        covers: Vec::new(),
        cover_bytes: Vec::new(),
        first_audio_stream_index: 0,
        format: Value::Null,
        streams: Value::Null,
        cue_sheet: None,
        track_count: 0,
    };
    let mut record = FileRecord::new(input.clone());
    record.tracks.push(TrackRecord {
        output: OutputInfo::from_input(&input, ""),
        status: TrackStatus::Fail,
    });
    record.log_line(format!("rejected: {reason}"));
    record
}

fn tags_from_value(v: &Value) -> TagMap {
    let mut tags = TagMap::new();
    if let Some(obj) = v.get("tags").and_then(Value::as_object) {
        for (k, v) in obj {
            if let Some(s) = v.as_str() {
                tags.set(k.to_lowercase(), s);
            }
        }
    }
    tags
}

async fn find_cue_sheet(path: &Path, warnings: &mut Vec<String>) -> Option<CueSheet> {
    let dir = path.parent()?;
    let input_norm = stringnorm(&path.file_stem()?.to_string_lossy());

    let mut read_dir = tokio::fs::read_dir(dir).await.ok()?;
    let mut best: Option<(f64, PathBuf)> = None;

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let candidate = entry.path();
        let is_cue = candidate
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case("cue"))
            .unwrap_or(false);
        if !is_cue {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else { continue };
        if metadata.len() > cuesheet::MAX_CUE_SHEET_BYTES {
            warnings.push(format!("cue sheet {} exceeds the size limit, ignored", candidate.display()));
            continue;
        }
        let stem = candidate.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let relation = stringrel(&stringnorm(&stem), &input_norm);
        if best.as_ref().map(|(score, _)| relation > *score).unwrap_or(true) {
            best = Some((relation, candidate));
        }
    }

    let (_, chosen) = best?;
    let body = tokio::fs::read_to_string(&chosen).await.ok()?;
    match cuesheet::parse(&body) {
        Ok(sheet) => Some(sheet),
        Err(source) => {
            warnings.push(format!("cue sheet {} failed to parse: {source}", chosen.display()));
            None
        }
    }
}

/// Picks the `CueFile` whose referenced filename best matches `path`'s own
/// filename, falling back to the first entry (covers the common
/// zero/one-`FILE` case, §8 boundary behavior).
fn select_cue_file<'a>(sheet: &'a CueSheet, path: &Path) -> Option<&'a kiln_core::CueFile> {
    let own_name = path.file_name()?.to_string_lossy().to_string();
    sheet
        .files
        .iter()
        .max_by(|a, b| {
            let score_a = stringrel(&stringnorm(&a.filename), &stringnorm(&own_name));
            let score_b = stringrel(&stringnorm(&b.filename), &stringnorm(&own_name));
            score_a.partial_cmp(&score_b).unwrap()
        })
        .or_else(|| sheet.files.first())
}

async fn probe_sibling_covers(path: &Path) -> Vec<CoverDescriptor> {
    let mut covers = Vec::new();
    let Some(dir) = path.parent() else { return covers };
    let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
        return covers;
    };

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let candidate = entry.path();
        let is_image = candidate
            .extension()
            .map(|e| SIBLING_IMAGE_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let Ok(bytes) = tokio::fs::read(&candidate).await else { continue };
        let Ok(format) = image::guess_format(&bytes) else { continue };
        let Ok((width, height)) = image::load_from_memory(&bytes).map(|img| (img.width(), img.height())) else {
            continue;
        };

        covers.push(CoverDescriptor {
            source: CoverSource::External(
                candidate.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            ),
            format: format!("{format:?}").to_lowercase(),
            width,
            height,
            partial_checksum: kiln_transform::cover::partial_checksum(&bytes),
        });
    }

    covers
}

fn path_hash(path: &Path) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

fn codec_extension(codec_name: &str) -> &'static str {
    match codec_name {
        "png" => "png",
        "bmp" => "bmp",
        "gif" => "gif",
        _ => "jpg",
    }
}

fn guess_container(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_from_value_lowercases_keys() {
        let value = serde_json::json!({"tags": {"ALBUM": "Foo", "Title": "Bar"}});
        let tags = tags_from_value(&value);
        assert_eq!(tags.get("album"), Some("Foo"));
        assert_eq!(tags.get("title"), Some("Bar"));
    }

    #[test]
    fn rejected_record_carries_fail_status_and_reason() {
        let record = rejected_record(Path::new("/music/a.flac"), "no audio stream present".to_string());
        assert_eq!(record.tracks.len(), 1);
        assert_eq!(record.tracks[0].status, TrackStatus::Fail);
        assert!(record.log.contains("no audio stream present"));
    }

    #[tokio::test]
    async fn missing_directory_yields_no_cue_sheet() {
        let mut warnings = Vec::new();
        let found = find_cue_sheet(Path::new("/nonexistent/path/a.flac"), &mut warnings).await;
        assert!(found.is_none());
    }
}
