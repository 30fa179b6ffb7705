use kiln_core::{TrackStatus, WriteDisposition};

/// What the transformer should actually do for one track (§4.6 decision table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    DeleteInput,
    Transcode,
    CopyOrRenameWithTagWrite,
}

/// The facts the decision table reads. `in_place` means the computed
/// destination and the canonicalized input path are the same file;
/// `needs_transcode` has already folded in the multi-track / container /
/// parameter / unsupported-tag conditions (see `needs_transcode` below).
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    pub status: TrackStatus,
    pub write: WriteDisposition,
    pub in_place: bool,
    pub removesource: bool,
    pub needs_transcode: bool,
}

/// Applies the materialization decision table (§4.6). `write = Suffix` under
/// `Exist` does not short-circuit — the table says "rewrite output path to a
/// temp sibling; continue", so the caller rewrites the destination before
/// calling this and falls through to the ordinary transcode/copy decision.
pub fn decide(input: DecisionInput) -> Action {
    if input.status == TrackStatus::Fail {
        return Action::Skip;
    }

    if input.status == TrackStatus::Exist {
        match input.write {
            WriteDisposition::Skip => {
                return if input.in_place && input.removesource {
                    Action::DeleteInput
                } else {
                    Action::Skip
                };
            }
            WriteDisposition::Overwrite if input.in_place && !input.removesource => {
                return Action::Skip;
            }
            WriteDisposition::Overwrite | WriteDisposition::Suffix => {}
        }
    }

    if input.needs_transcode {
        Action::Transcode
    } else {
        Action::CopyOrRenameWithTagWrite
    }
}

/// Whether materialization must go through the transcoder rather than the
/// tag-only fast path (§4.6 "Transcode required if").
pub fn needs_transcode(
    multi_track: bool,
    input_container: &str,
    output_container: &str,
    params: &[String],
    tags_outside_fixed_set_changed: bool,
) -> bool {
    const COPY_PARAMS: [&str; 2] = ["-c:a", "copy"];
    multi_track
        || input_container != output_container
        || params != COPY_PARAMS
        || tags_outside_fixed_set_changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DecisionInput {
        DecisionInput {
            status: TrackStatus::Ok,
            write: WriteDisposition::Suffix,
            in_place: false,
            removesource: false,
            needs_transcode: false,
        }
    }

    #[test]
    fn fail_always_skips() {
        let mut input = base();
        input.status = TrackStatus::Fail;
        input.needs_transcode = true;
        assert_eq!(decide(input), Action::Skip);
    }

    #[test]
    fn exist_skip_in_place_removesource_deletes_input() {
        let mut input = base();
        input.status = TrackStatus::Exist;
        input.write = WriteDisposition::Skip;
        input.in_place = true;
        input.removesource = true;
        assert_eq!(decide(input), Action::DeleteInput);
    }

    #[test]
    fn exist_skip_otherwise_skips() {
        let mut input = base();
        input.status = TrackStatus::Exist;
        input.write = WriteDisposition::Skip;
        assert_eq!(decide(input), Action::Skip);
    }

    #[test]
    fn exist_overwrite_in_place_keep_source_skips() {
        let mut input = base();
        input.status = TrackStatus::Exist;
        input.write = WriteDisposition::Overwrite;
        input.in_place = true;
        input.removesource = false;
        assert_eq!(decide(input), Action::Skip);
    }

    #[test]
    fn exist_suffix_falls_through_to_copy() {
        let mut input = base();
        input.status = TrackStatus::Exist;
        input.write = WriteDisposition::Suffix;
        assert_eq!(decide(input), Action::CopyOrRenameWithTagWrite);
    }

    #[test]
    fn needs_transcode_when_container_differs() {
        assert!(needs_transcode(false, "flac", "mp3", &["-c:a".into(), "copy".into()], false));
    }

    #[test]
    fn no_transcode_for_plain_copy() {
        assert!(!needs_transcode(false, "flac", "flac", &["-c:a".into(), "copy".into()], false));
    }
}
