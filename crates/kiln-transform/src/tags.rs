use std::path::Path;

use kiln_core::TagMap;
use lofty::file::TaggedFileExt;
use lofty::prelude::{Accessor, TagExt};
use lofty::probe::Probe;
use lofty::tag::Tag;

use crate::error::TransformError;

/// The only tag keys the lightweight tag writer supports (§4.6). Anything else
/// changing between input and output forces a transcode.
pub const FIXED_TAG_KEYS: &[&str] = &["album", "artist", "comment", "genre", "title", "date", "track"];

/// Whether `date`/`track` differences can go through the fast path: both are
/// only numerically parseable when they hold plain integers.
fn numeric_exempt(key: &str, value: &str) -> bool {
    matches!(key, "date" | "track") && value.parse::<i64>().is_ok()
}

/// True if `input`/`output` differ on any key outside `FIXED_TAG_KEYS`, or on
/// `date`/`track` in a way that isn't numerically parseable — either forces a
/// promotion to transcode (§4.6 "Tag-library fast path").
pub fn requires_transcode_for_tags(input: &TagMap, output: &TagMap) -> bool {
    let mut keys: Vec<&String> = input.0.keys().chain(output.0.keys()).collect();
    keys.sort_unstable();
    keys.dedup();

    for key in keys {
        let before = input.get(key).unwrap_or("");
        let after = output.get(key).unwrap_or("");
        if before == after {
            continue;
        }
        let in_fixed_set = FIXED_TAG_KEYS.contains(&key.as_str());
        if !in_fixed_set {
            return true;
        }
        if matches!(key.as_str(), "date" | "track") && !numeric_exempt(key, after) {
            return true;
        }
    }
    false
}

/// Writes `tags` onto `path` through the fixed-key-set fast path, without
/// touching any other existing tag frame.
pub fn write_fast_path(path: &Path, tags: &TagMap) -> Result<(), TransformError> {
    let mut tagged = Probe::open(path)?.read()?;
    let mut tag = tagged.primary_tag().cloned().unwrap_or_else(|| Tag::new(tagged.primary_tag_type()));

    for key in FIXED_TAG_KEYS {
        match tags.get(key) {
            Some(value) => set_fixed_tag(&mut tag, key, value),
            None => clear_fixed_tag(&mut tag, key),
        }
    }

    tag.save_to_path(path, lofty::config::WriteOptions::default())?;
    Ok(())
}

fn set_fixed_tag(tag: &mut Tag, key: &str, value: &str) {
    match key {
        "album" => tag.set_album(value.to_string()),
        "artist" => tag.set_artist(value.to_string()),
        "comment" => tag.set_comment(value.to_string()),
        "genre" => tag.set_genre(value.to_string()),
        "title" => tag.set_title(value.to_string()),
        "date" => {
            if let Ok(n) = value.parse::<u32>() {
                tag.set_year(n);
            }
        }
        "track" => {
            if let Ok(n) = value.parse::<u32>() {
                tag.set_track(n);
            }
        }
        _ => {}
    }
}

fn clear_fixed_tag(tag: &mut Tag, key: &str) {
    match key {
        "album" => tag.remove_album(),
        "artist" => tag.remove_artist(),
        "comment" => tag.remove_comment(),
        "genre" => tag.remove_genre(),
        "title" => tag.remove_title(),
        "date" => tag.remove_year(),
        "track" => tag.remove_track(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfixed_key_change_forces_transcode() {
        let mut a = TagMap::new();
        a.set("composer", "X");
        let b = TagMap::new();
        assert!(requires_transcode_for_tags(&a, &b));
    }

    #[test]
    fn fixed_key_change_does_not_force_transcode() {
        let mut a = TagMap::new();
        a.set("title", "Old");
        let mut b = TagMap::new();
        b.set("title", "New");
        assert!(!requires_transcode_for_tags(&a, &b));
    }

    #[test]
    fn non_numeric_track_forces_transcode() {
        let a = TagMap::new();
        let mut b = TagMap::new();
        b.set("track", "three");
        assert!(requires_transcode_for_tags(&a, &b));
    }

    #[test]
    fn numeric_track_stays_on_fast_path() {
        let a = TagMap::new();
        let mut b = TagMap::new();
        b.set("track", "3");
        assert!(!requires_transcode_for_tags(&a, &b));
    }
}
