use std::time::Duration;

use kiln_core::{CueFile, CueSheet, CueTrack, TagMap};

use crate::error::ProbeError;

/// Frames per second used by cue-sheet index times (75/sec, per the glossary).
pub const FRAMES_PER_SECOND: u64 = 75;

/// Maximum cue-sheet size the analyzer will parse (§4.5 step 3); larger files are
/// a warning, not a hard failure, at the call site.
pub const MAX_CUE_SHEET_BYTES: u64 = 10 * 1024 * 1024;

/// Parses a cue sheet body into the shared `CueSheet` shape.
///
/// A cue-sheet with zero `FILE` entries maps all tracks to the empty filename key
/// (§8 boundary behavior): if `TRACK` commands appear before any `FILE` command,
/// they are collected into a `CueFile` with an empty `filename`.
pub fn parse(source: &str) -> Result<CueSheet, ProbeError> {
    let mut header = TagMap::new();
    let mut files: Vec<CueFile> = Vec::new();
    let mut current_file: Option<CueFile> = None;
    let mut current_track: Option<CueTrack> = None;
    let mut pending_pregap_duration_frames: Option<u64> = None;

    let flush_track = |file: &mut CueFile, track: Option<CueTrack>| {
        if let Some(track) = track {
            file.tracks.push(track);
        }
    };

    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let (keyword, rest) = split_keyword(line);

        match keyword.to_ascii_uppercase().as_str() {
            "FILE" => {
                if let Some(track) = current_track.take() {
                    if let Some(file) = current_file.as_mut() {
                        file.tracks.push(track);
                    }
                }
                if let Some(file) = current_file.take() {
                    files.push(file);
                }
                let filename = first_quoted_or_word(rest).unwrap_or_default();
                current_file = Some(CueFile {
                    filename,
                    tracks: Vec::new(),
                });
            }
            "TRACK" => {
                if let Some(track) = current_track.take() {
                    let file = current_file.get_or_insert_with(|| CueFile {
                        filename: String::new(),
                        tracks: Vec::new(),
                    });
                    file.tracks.push(track);
                }
                let number = rest
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(0);
                current_track = Some(CueTrack {
                    number,
                    tags: TagMap::new(),
                    start_frames: None,
                    pregap_start_frames: None,
                });
                pending_pregap_duration_frames = None;
            }
            "INDEX" => {
                let mut parts = rest.split_whitespace();
                let index_no = parts.next().and_then(|n| n.parse::<u32>().ok());
                let time = parts.next().and_then(parse_cue_time_frames);
                if let (Some(index_no), Some(frames)) = (index_no, time) {
                    if let Some(track) = current_track.as_mut() {
                        if index_no == 0 {
                            track.pregap_start_frames = Some(frames);
                        } else if index_no == 1 {
                            track.start_frames = Some(frames);
                            if let Some(dur) = pending_pregap_duration_frames.take() {
                                track.pregap_start_frames = Some(frames.saturating_sub(dur));
                            }
                        }
                    }
                }
            }
            "PREGAP" => {
                if let Some(frames) = rest.split_whitespace().next().and_then(parse_cue_time_frames)
                {
                    pending_pregap_duration_frames = Some(frames);
                }
            }
            "PERFORMER" | "SONGWRITER" => {
                let value = first_quoted_or_word(rest).unwrap_or_default();
                if let Some(track) = current_track.as_mut() {
                    track.tags.set("album_artist", value);
                } else {
                    header.set("album_artist", value);
                }
            }
            "TITLE" => {
                let value = first_quoted_or_word(rest).unwrap_or_default();
                if let Some(track) = current_track.as_mut() {
                    track.tags.set("title", value);
                } else {
                    header.set("album", value);
                }
            }
            "REM" => {
                let mut parts = rest.splitn(2, char::is_whitespace);
                if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                    let value = strip_quotes(value.trim());
                    if let Some(track) = current_track.as_mut() {
                        track.tags.set(key.to_lowercase(), value);
                    } else {
                        header.set(key.to_lowercase(), value);
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(track) = current_track.take() {
        let file = current_file.get_or_insert_with(|| CueFile {
            filename: String::new(),
            tracks: Vec::new(),
        });
        file.tracks.push(track);
    }
    if let Some(file) = current_file.take() {
        files.push(file);
    }
    let _ = flush_track;

    Ok(CueSheet { header, files })
}

fn split_keyword(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((kw, rest)) => (kw, rest.trim()),
        None => (line, ""),
    }
}

fn first_quoted_or_word(rest: &str) -> Option<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    Some(strip_quotes(rest))
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') {
        if let Some(end) = s[1..].find('"') {
            return s[1..=end].to_string();
        }
    }
    s.to_string()
}

/// Parses `mm:ss:ff` (frames, 75/sec) into a total-frame count.
pub fn parse_cue_time_frames(s: &str) -> Option<u64> {
    let mut parts = s.split(':');
    let mm: u64 = parts.next()?.parse().ok()?;
    let ss: u64 = parts.next()?.parse().ok()?;
    let ff: u64 = parts.next()?.parse().ok()?;
    Some(mm * 60 * FRAMES_PER_SECOND + ss * FRAMES_PER_SECOND + ff)
}

pub fn frames_to_duration(frames: u64) -> Duration {
    Duration::from_secs_f64(frames as f64 / FRAMES_PER_SECOND as f64)
}

/// One computed disc-split boundary: start offset and duration within the source
/// file, or `None`/`None` for a track index past the end of the cue sheet (§8
/// boundary: track 4 of a 4-track sheet is `""`, `""`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPoint {
    pub start: Option<Duration>,
    pub duration: Option<Duration>,
}

/// Computes start/duration for every track across all `FILE` entries, concatenated
/// in cue-sheet order, given the total duration of the (single, in the common
/// case) referenced audio. Split points use each track's `INDEX 01` time only;
/// pregap offsets are carried on `CueTrack` for scripts but do not affect the
/// duration split, matching the reference scenario in §8.
pub fn split_points(sheet: &CueSheet, total_duration: Duration) -> Vec<SplitPoint> {
    let starts_frames: Vec<u64> = sheet
        .files
        .iter()
        .flat_map(|f| f.tracks.iter())
        .map(|t| t.start_frames.unwrap_or(0))
        .collect();

    let mut points = Vec::with_capacity(starts_frames.len());
    for (i, &start_frames) in starts_frames.iter().enumerate() {
        let start = frames_to_duration(start_frames);
        let duration = if let Some(&next_frames) = starts_frames.get(i + 1) {
            Some(frames_to_duration(next_frames.saturating_sub(start_frames)))
        } else if total_duration > start {
            Some(total_duration - start)
        } else {
            None
        };
        points.push(SplitPoint {
            start: Some(start),
            duration,
        });
    }
    points
}

/// Looks up the split point for a 0-based track index, returning `None`/`None`
/// when the index is past the end of the cue sheet.
pub fn split_point_at(points: &[SplitPoint], index: usize) -> SplitPoint {
    points.get(index).copied().unwrap_or(SplitPoint {
        start: None,
        duration: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sheet() -> CueSheet {
        let source = r#"
            PERFORMER "Some Artist"
            TITLE "Some Album"
            FILE "audio.wav" WAVE
              TRACK 01 AUDIO
                TITLE "Track One"
                INDEX 01 00:00:00
              TRACK 02 AUDIO
                TITLE "Track Two"
                INDEX 01 06:40:27
              TRACK 03 AUDIO
                TITLE "Track Three"
                PREGAP 00:02:00
                INDEX 01 10:54:00
              TRACK 04 AUDIO
                TITLE "Track Four"
                INDEX 01 17:04:00
        "#;
        parse(source).unwrap()
    }

    #[test]
    fn header_tags_captured() {
        let sheet = sample_sheet();
        assert_eq!(sheet.header.get("album_artist"), Some("Some Artist"));
        assert_eq!(sheet.header.get("album"), Some("Some Album"));
    }

    #[test]
    fn pregap_resolved_from_duration_form() {
        let sheet = sample_sheet();
        let track3 = &sheet.files[0].tracks[2];
        // INDEX 01 at 10:54:00 minus a 00:02:00 pregap duration = 10:52:00.
        assert_eq!(
            track3.pregap_start_frames,
            Some(parse_cue_time_frames("10:52:00").unwrap())
        );
    }

    #[test]
    fn split_points_match_reference_scenario() {
        let sheet = sample_sheet();
        let total = Duration::from_secs(20 * 60 + 4);
        let points = split_points(&sheet, total);

        assert_eq!(points[0].start, Some(Duration::from_millis(0)));
        assert_eq!(points[0].duration, Some(Duration::from_millis(6 * 60_000 + 40_360)));

        assert_eq!(points[1].start, Some(Duration::from_millis(6 * 60_000 + 40_360)));
        assert_eq!(points[1].duration, Some(Duration::from_millis(4 * 60_000 + 13_640)));

        assert_eq!(points[3].start, Some(Duration::from_millis(17 * 60_000)));
        assert_eq!(points[3].duration, Some(Duration::from_millis(3 * 60_000)));

        let past_end = split_point_at(&points, 4);
        assert_eq!(past_end.start, None);
        assert_eq!(past_end.duration, None);
    }

    #[test]
    fn zero_file_entries_maps_to_empty_filename() {
        let source = "TRACK 01 AUDIO\nTITLE \"Solo\"\nINDEX 01 00:00:00\n";
        let sheet = parse(source).unwrap();
        assert_eq!(sheet.files.len(), 1);
        assert_eq!(sheet.files[0].filename, "");
        assert_eq!(sheet.files[0].tracks.len(), 1);
    }
}
