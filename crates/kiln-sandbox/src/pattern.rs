use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::SandboxError;

/// Process-wide memoized regex cache keyed by pattern text (§4.4). The cache
/// lock is held only long enough to look up or insert a compiled pattern;
/// compilation itself happens under the lock since it's cheap relative to the
/// scripts that will run it thousands of times.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, Arc<Regex>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub fn compiled(pattern: &str) -> Result<Arc<Regex>, SandboxError> {
    let mut cache = REGEX_CACHE.lock().expect("regex cache mutex poisoned");
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Arc::new(Regex::new(pattern).map_err(|e| SandboxError::InvalidPattern(pattern.to_string(), e))?);
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// Codepoint length, not byte length — scripts operate on grapheme-adjacent
/// tag text (artist names, titles) that routinely contains multi-byte UTF-8.
pub fn codepoint_len(s: &str) -> usize {
    s.chars().count()
}

/// Grapheme-cluster count, exposed alongside `codepoint_len` for scripts that
/// need visual-character rather than codepoint semantics.
pub fn grapheme_len(s: &str) -> usize {
    s.graphemes(true).count()
}

/// Lua-style 1-based inclusive sub-range with negative indices counting from
/// the end, resolved in codepoints.
pub fn sub_range(s: &str, start: i64, end: i64) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    if len == 0 {
        return String::new();
    }
    let normalize_start = |idx: i64| if idx < 0 { (len + idx + 1).max(1) } else { idx.max(1) };
    let normalize_end = |idx: i64| if idx < 0 { len + idx + 1 } else { idx.min(len) };

    let start = normalize_start(start);
    let end = normalize_end(end);
    if start > end || start > len || end < 1 {
        return String::new();
    }
    chars[(start - 1) as usize..end as usize].iter().collect()
}

pub fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pattern_text_reuses_cached_compilation() {
        let a = compiled(r"\d+").unwrap();
        let b = compiled(r"\d+").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sub_range_handles_negative_indices() {
        assert_eq!(sub_range("hello", -3, -1), "llo");
        assert_eq!(sub_range("hello", 1, 2), "he");
        assert_eq!(sub_range("hello", 2, 100), "ello");
    }

    #[test]
    fn reverse_is_codepoint_aware() {
        assert_eq!(reverse("abc"), "cba");
    }
}
