//! Generic string-similarity scoring used by the candidate matcher.
//!
//! Two independent heuristics are combined by taking their maximum: edit
//! distance rescues near-typos, longest-common-substring overlap rescues
//! truncated or expanded names. Neither alone is sufficient for the kind of
//! names mod authors come up with.

/// Normalize a string for comparison (lowercase, alphanumerics only).
///
/// Idempotent: normalizing an already-normalized string is a no-op.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Levenshtein edit distance, iterative two-row form.
fn edit_distance(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut curr = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let insert = curr[j] + 1;
            let remove = prev[j + 1] + 1;
            let replace = prev[j] + usize::from(ca != cb);
            curr.push(insert.min(remove).min(replace));
        }
        prev = curr;
    }
    prev[b.len()]
}

/// Length of the longest common substring of two strings.
fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // One row of the classic DP table is enough
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for ca in &a {
        let mut curr = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                curr[j + 1] = prev[j] + 1;
                best = best.max(curr[j + 1]);
            }
        }
        prev = curr;
    }
    best
}

/// Percent similarity (0-100) between two free-text names.
///
/// Shortcuts: equal normalized strings score 100, containment scores 90.
/// Otherwise the maximum of the edit-distance score and the substring-overlap
/// score, both scaled by the longer normalized length.
pub fn score(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    if a == b {
        return 100;
    }
    if a.contains(&b) || b.contains(&a) {
        return 90;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let lev = 100usize.saturating_sub(edit_distance(&a, &b) * 100 / max_len);
    let substr = longest_common_substring(&a, &b) * 100 / max_len;
    lev.max(substr).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_is_idempotent() {
        for s in ["Dynamic Maps", "com.mpstark.dynamicmaps", "UIFixes-5.3.0", "  ", "Ünïcode!"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "normalize not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_identical_strings_score_100() {
        assert_eq!(score("DynamicMaps", "DynamicMaps"), 100);
        assert_eq!(score("Dynamic Maps", "dynamicmaps"), 100);
    }

    #[test]
    fn test_containment_scores_90() {
        assert_eq!(score("Croupier", "Croupier - loadout generator"), 90);
    }

    #[test]
    fn test_near_typo_rescued_by_edit_distance() {
        // One substitution in an 11-char name
        let s = score("DynamicMaps", "DynamicMapz");
        assert!(s >= 85, "expected near-typo score >= 85, got {}", s);
    }

    #[test]
    fn test_disjoint_strings_score_low() {
        let s = score("Croupier", "WeatherTweaks");
        assert!(s < 50, "expected disjoint score < 50, got {}", s);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        assert_eq!(score("", "anything"), 0);
        assert_eq!(score("!!!", "anything"), 0);
    }
}
