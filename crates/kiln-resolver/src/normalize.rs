use strsim::damerau_levenshtein;
use unicode_segmentation::UnicodeSegmentation;

/// Lowercase; strip non-alphanumeric characters; strip leading zeros from runs of
/// digits (§4.3). Idempotent: `stringnorm(stringnorm(s)) == stringnorm(s)`.
pub fn stringnorm(s: &str) -> String {
    let alnum: String = s
        .graphemes(true)
        .filter(|g| g.chars().all(|c| c.is_alphanumeric()))
        .flat_map(|g| g.chars())
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect();

    strip_leading_zero_runs(&alnum)
}

fn strip_leading_zero_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            // The run opening the string is dropped outright, placeholder and all:
            // "01title" -> "title", not "1title".
            if start == 0 {
                continue;
            }
            let run: String = chars[start..i].iter().collect();
            let trimmed = run.trim_start_matches('0');
            if trimmed.is_empty() {
                // An interior all-zero run still contributes a single "0".
                out.push('0');
            } else {
                out.push_str(trimmed);
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// `1 - damerau_levenshtein(a, b) / max(len(a), len(b))` on the rune (codepoint)
/// sequence. Two empty strings relate as 1.
pub fn stringrel(a: &str, b: &str) -> f64 {
    let a_runes: Vec<char> = a.chars().collect();
    let b_runes: Vec<char> = b.chars().collect();

    if a_runes.is_empty() && b_runes.is_empty() {
        return 1.0;
    }

    let max_len = a_runes.len().max(b_runes.len());
    if max_len == 0 {
        return 1.0;
    }

    let distance = damerau_levenshtein(a, b);
    1.0 - (distance as f64 / max_len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringnorm_scenarios() {
        assert_eq!(stringnorm("01 — Title"), "title");
        assert_eq!(stringnorm("A"), "a");
        assert_eq!(stringnorm("00a"), "a");
        assert_eq!(stringnorm("a0"), "a0");
    }

    #[test]
    fn stringnorm_is_idempotent() {
        for s in ["01 — Title", "A", "00a", "a0", "", "Feat. THE Machines"] {
            let once = stringnorm(s);
            let twice = stringnorm(&once);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn stringrel_scenarios() {
        assert_eq!(stringrel("foo", "foo"), 1.0);
        assert!((stringrel("foobar", "foobaz") - (5.0 / 6.0)).abs() < 1e-9);
        assert_eq!(stringrel("", ""), 1.0);
        assert_eq!(stringrel("", "b"), 0.0);
    }

    #[test]
    fn stringrel_symmetry_and_identity() {
        for (a, b) in [("hello", "world"), ("foo", "foobar"), ("", "x")] {
            assert_eq!(stringrel(a, b), stringrel(b, a));
        }
        assert_eq!(stringrel("nonempty", "nonempty"), 1.0);
    }
}
