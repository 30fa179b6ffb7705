use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque catalogue identifier. The empty string is the sentinel "unknown"; caching
/// a zero id for an album-key records a prior failed lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReleaseId(pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordingId(pub String);

impl ReleaseId {
    pub fn unknown() -> Self {
        ReleaseId(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

impl RecordingId {
    pub fn unknown() -> Self {
        RecordingId(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

/// Clustering key for release-identifier lookups: normalized album, album-artist, date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlbumKey {
    pub album: String,
    pub album_artist: String,
    pub date: String,
}

impl AlbumKey {
    pub fn new(
        album: impl Into<String>,
        album_artist: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        AlbumKey {
            album: album.into(),
            album_artist: album_artist.into(),
            date: date.into(),
        }
    }
}

/// Where a cover's bytes were found; keys the per-record cover byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CoverSource {
    Embedded(usize),
    External(String),
    Online,
}

/// Input-side cover metadata: format, dimensions, and a partial checksum over the
/// first 32 KiB. Two covers are identical iff their partial checksums match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverDescriptor {
    pub source: CoverSource,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub partial_checksum: String,
}

pub const COVER_CHECKSUM_PREFIX_BYTES: usize = 32 * 1024;

/// The script-populated disposition for an already-existing destination. A single
/// enum, never a bare string, resolving the inconsistent literal-vs-constant split
/// noted against the reference implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    Overwrite,
    Skip,
    #[default]
    Suffix,
}

/// Per-track status set by the analyzer, read by the transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Ok,
    Fail,
    Exist,
}

/// A lowercase-keyed tag map. An empty value is equivalent to the tag being absent;
/// both the reader and the writer normalize this on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMap(pub BTreeMap<String, String>);

impl TagMap {
    pub fn new() -> Self {
        TagMap::default()
    }

    /// Inserts `value` under `key`, dropping the key entirely if `value` is empty.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_lowercase();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn overlay(&mut self, other: &TagMap) {
        for (k, v) in &other.0 {
            self.set(k.clone(), v.clone());
        }
    }
}

/// An optional cue-sheet attached to an input file. Parsing lives in `kiln-probe`;
/// this crate only names the shape that crosses the analyzer/sandbox boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueSheet {
    pub header: TagMap,
    pub files: Vec<CueFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueFile {
    /// The `FILE` entry's referenced filename; empty when the cue-sheet has no
    /// `FILE` entries at all (all tracks then map to this empty key).
    pub filename: String,
    pub tracks: Vec<CueTrack>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueTrack {
    pub number: u32,
    pub tags: TagMap,
    /// Index 1 start time, in frames (75/sec) from the start of the referenced file.
    pub start_frames: Option<u64>,
    /// Index 0 (pregap) start time, in frames, when present.
    pub pregap_start_frames: Option<u64>,
}

/// Immutable (after the analyzer sets it) description of one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    pub canonical_path: PathBuf,
    pub bitrate_bps: u64,
    pub tags: TagMap,
    pub modified_unix: u64,
    pub covers: Vec<CoverDescriptor>,
    /// The private cover byte buffer `CoverSource` keys into: one entry per
    /// embedded/online cover the analyzer fetched. A `Vec` of pairs rather
    /// than a map keyed directly by `CoverSource`, since the latter would not
    /// round-trip through a JSON object key.
    pub cover_bytes: Vec<(CoverSource, Vec<u8>)>,
    pub first_audio_stream_index: usize,
    pub format: serde_json::Value,
    pub streams: serde_json::Value,
    pub cue_sheet: Option<CueSheet>,
    pub track_count: usize,
}

impl InputInfo {
    pub fn cover_bytes(&self, source: &CoverSource) -> Option<&[u8]> {
        self.cover_bytes.iter().find(|(s, _)| s == source).map(|(_, bytes)| bytes.as_slice())
    }
}

/// One cover transfer requested by the script: where to read it from and, if
/// re-encoding is needed, the parameters to drive the transcoder with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCover {
    pub source: CoverSource,
    pub params: Vec<String>,
    pub format: String,
}

/// The script-mutable document for one output track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputInfo {
    pub destination: PathBuf,
    pub container: String,
    pub params: Vec<String>,
    pub tags: TagMap,
    pub covers: Vec<OutputCover>,
    pub write: WriteDisposition,
    pub removesource: bool,
}

impl OutputInfo {
    /// A fresh output pre-populated from the input and foolproofing defaults
    /// (§4.5 step 7): empty format falls back to the input's container, empty
    /// params fall back to the audio-copy pair.
    pub fn from_input(input: &InputInfo, source_container: &str) -> Self {
        OutputInfo {
            destination: input.canonical_path.clone(),
            container: source_container.to_string(),
            params: vec!["-c:a".to_string(), "copy".to_string()],
            tags: input.tags.clone(),
            covers: Vec::new(),
            write: WriteDisposition::default(),
            removesource: false,
        }
    }
}

/// One entry per track (usually one, more if a cue-sheet was found).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub output: OutputInfo,
    pub status: TrackStatus,
}

/// The pipeline token: one per input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub input: InputInfo,
    pub tracks: Vec<TrackRecord>,
    #[serde(skip)]
    pub log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tag_value_is_absent() {
        let mut tags = TagMap::new();
        tags.set("Title", "Song");
        tags.set("Title", "");
        assert_eq!(tags.get("title"), None);
        assert!(tags.0.is_empty());
    }

    #[test]
    fn tag_keys_are_lowercased() {
        let mut tags = TagMap::new();
        tags.set("ALBUM", "Foo");
        assert_eq!(tags.get("album"), Some("Foo"));
    }

    #[test]
    fn release_id_empty_is_unknown() {
        assert!(ReleaseId::unknown().is_unknown());
        assert!(!ReleaseId("abc".into()).is_unknown());
    }
}

impl FileRecord {
    pub fn new(input: InputInfo) -> Self {
        FileRecord {
            input,
            tracks: Vec::new(),
            log: String::new(),
        }
    }

    /// Appends a line to this record's private log buffer. Workers write only to
    /// this buffer; it is flushed atomically at the end of the owning stage so
    /// per-file log sections are never interleaved with another file's.
    pub fn log_line(&mut self, line: impl AsRef<str>) {
        if !self.log.is_empty() {
            self.log.push('\n');
        }
        self.log.push_str(line.as_ref());
    }
}
