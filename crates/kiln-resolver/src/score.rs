use kiln_core::{RecordingId, ReleaseId};

use crate::normalize::{stringnorm, stringrel};

/// Local tags gathered by the analyzer, as seen by the scorer.
#[derive(Debug, Clone, Default)]
pub struct LocalTrack {
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub year: Option<u32>,
    pub duration_secs: Option<f64>,
}

/// One (recording, release, medium) candidate triple from the catalogue response.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub recording_id: RecordingId,
    pub release_id: ReleaseId,
    pub recording_title: String,
    pub recording_artists: Vec<String>,
    pub release_title: String,
    pub release_artists: Vec<String>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub year: Option<u32>,
    pub duration_secs: Option<f64>,
}

const WEIGHT_TITLE: f64 = 26.0;
const WEIGHT_ARTIST: f64 = 25.0;
const WEIGHT_ALBUM_ARTIST: f64 = 13.0;
const WEIGHT_ALBUM: f64 = 13.0;
const WEIGHT_POSITION: f64 = 9.0;
const WEIGHT_YEAR: f64 = 7.0;
const WEIGHT_DURATION: f64 = 7.0;
const WEIGHT_TOTAL: f64 =
    WEIGHT_TITLE + WEIGHT_ARTIST + WEIGHT_ALBUM_ARTIST + WEIGHT_ALBUM + WEIGHT_POSITION + WEIGHT_YEAR + WEIGHT_DURATION;

fn best_relation(haystack: &[String], needle: &str) -> f64 {
    let needle_norm = stringnorm(needle);
    haystack
        .iter()
        .map(|candidate| stringrel(&stringnorm(candidate), &needle_norm))
        .fold(0.0_f64, f64::max)
}

/// Year 0 ("unknown year" in catalogue responses) contributes 0 unconditionally,
/// including when the local year is also 0 — a shared-unknown is not a match.
/// This resolves the ambiguity noted against the reference implementation.
fn year_component(local_year: Option<u32>, candidate_year: Option<u32>) -> f64 {
    match (local_year, candidate_year) {
        (Some(local), Some(candidate)) if local != 0 && candidate != 0 => {
            if local == candidate {
                1.0
            } else if local.abs_diff(candidate) == 1 {
                0.75
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn duration_component(local: Option<f64>, candidate: Option<f64>) -> f64 {
    match (local, candidate) {
        (Some(local), Some(candidate)) if local > 0.0 => {
            let delta = (local - candidate).abs();
            (1.0 - delta / local).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

fn position_component(local: &LocalTrack, candidate: &Candidate) -> f64 {
    let disc_match = match (local.disc_number, candidate.disc_number) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    };
    let track_match = match (local.track_number, candidate.track_number) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    };
    let count_match = match (local.track_count, candidate.track_count) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    };
    (disc_match + track_match + count_match) / 3.0
}

/// Weighted acoustic-match score in `[0, 1]` for one candidate triple (§4.3).
pub fn score(local: &LocalTrack, candidate: &Candidate) -> f64 {
    let title = stringrel(&stringnorm(&candidate.recording_title), &stringnorm(&local.title));
    let artist = best_relation(&candidate.recording_artists, &local.artist);
    let album_artist = best_relation(&candidate.release_artists, &local.album_artist);
    let album = stringrel(&stringnorm(&candidate.release_title), &stringnorm(&local.album));
    let position = position_component(local, candidate);
    let year = year_component(local.year, candidate.year);
    let duration = duration_component(local.duration_secs, candidate.duration_secs);

    let weighted = title * WEIGHT_TITLE
        + artist * WEIGHT_ARTIST
        + album_artist * WEIGHT_ALBUM_ARTIST
        + album * WEIGHT_ALBUM
        + position * WEIGHT_POSITION
        + year * WEIGHT_YEAR
        + duration * WEIGHT_DURATION;

    weighted / WEIGHT_TOTAL
}

/// Picks the highest-scoring candidate, short-circuiting on a perfect score.
pub fn best_match<'a>(local: &LocalTrack, candidates: &'a [Candidate]) -> Option<(&'a Candidate, f64)> {
    let mut best: Option<(&Candidate, f64)> = None;
    for candidate in candidates {
        let s = score(local, candidate);
        if s >= 1.0 {
            return Some((candidate, s));
        }
        if best.as_ref().map(|(_, best_s)| s > *best_s).unwrap_or(true) {
            best = Some((candidate, s));
        }
    }
    best
}

/// Track matching when the recording id is not known from the fingerprint (cache
/// hit path, §4.3): filter by duration within ±4 seconds of local duration; if one
/// remains, select it; if several, pick the maximum of `3*title + 2*artist +
/// 1*track` relations (normalized to `[0, 1]`).
pub fn select_without_recording_id<'a>(
    local: &LocalTrack,
    candidates: &'a [Candidate],
) -> Option<&'a Candidate> {
    let local_duration = local.duration_secs?;
    let mut within_window: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            c.duration_secs
                .map(|d| (d - local_duration).abs() <= 4.0)
                .unwrap_or(false)
        })
        .collect();

    if within_window.len() <= 1 {
        return within_window.pop();
    }

    let local_track_str = local.track_number.map(|n| n.to_string()).unwrap_or_default();
    within_window.into_iter().max_by(|a, b| {
        let score_of = |c: &Candidate| {
            let title = stringrel(&stringnorm(&c.recording_title), &stringnorm(&local.title));
            let artist = best_relation(&c.recording_artists, &local.artist);
            let track = stringrel(
                &c.track_number.map(|n| n.to_string()).unwrap_or_default(),
                &local_track_str,
            );
            3.0 * title + 2.0 * artist + track
        };
        score_of(a).partial_cmp(&score_of(b)).unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            recording_id: RecordingId("rec-1".into()),
            release_id: ReleaseId("rel-1".into()),
            recording_title: "Song".into(),
            recording_artists: vec!["Artist".into()],
            release_title: "Album".into(),
            release_artists: vec!["Artist".into()],
            disc_number: Some(1),
            track_number: Some(3),
            track_count: Some(10),
            year: Some(1999),
            duration_secs: Some(200.0),
        }
    }

    fn local() -> LocalTrack {
        LocalTrack {
            title: "Song".into(),
            artist: "Artist".into(),
            album_artist: "Artist".into(),
            album: "Album".into(),
            disc_number: Some(1),
            track_number: Some(3),
            track_count: Some(10),
            year: Some(1999),
            duration_secs: Some(200.0),
        }
    }

    #[test]
    fn perfect_match_scores_one() {
        assert_eq!(score(&local(), &candidate()), 1.0);
    }

    #[test]
    fn year_zero_never_scores() {
        let mut local = local();
        local.year = Some(0);
        let mut candidate = candidate();
        candidate.year = Some(0);
        assert_eq!(year_component(local.year, candidate.year), 0.0);
    }

    #[test]
    fn best_match_short_circuits_on_perfect_score() {
        let mut decoy = candidate();
        decoy.recording_id = RecordingId("decoy".into());
        decoy.recording_title = "Totally Different".into();
        let candidates = vec![decoy, candidate()];
        let (picked, s) = best_match(&local(), &candidates).unwrap();
        assert_eq!(picked.recording_id, RecordingId("rec-1".into()));
        assert_eq!(s, 1.0);
    }

    #[test]
    fn select_without_recording_id_filters_by_duration_window() {
        let mut far = candidate();
        far.duration_secs = Some(150.0);
        let close = candidate();
        let candidates = vec![far, close];
        let picked = select_without_recording_id(&local(), &candidates).unwrap();
        assert_eq!(picked.duration_secs, Some(200.0));
    }
}
