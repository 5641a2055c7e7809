//! Tag list handling.

use std::collections::HashSet;

fn normalize(tag: &str) -> Option<&str> {
    let tag = tag.trim();
    (!tag.is_empty()).then_some(tag)
}

/// Union of `existing` and `desired`, existing tags first.
///
/// Tags are trimmed, empty ones dropped and duplicates removed (case-sensitive).
pub fn merge_tags<S: AsRef<str>>(existing: &[S], desired: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(desired.iter())
        .filter_map(|t| normalize(t.as_ref()))
        .filter(|t| seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

/// Desired tags not yet present in `existing`.
pub fn missing_tags<S: AsRef<str>>(existing: &[S], desired: &[S]) -> Vec<String> {
    let present: HashSet<&str> = existing.iter().filter_map(|t| normalize(t.as_ref())).collect();
    let mut seen = HashSet::new();
    desired
        .iter()
        .filter_map(|t| normalize(t.as_ref()))
        .filter(|t| !present.contains(t) && seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_keeps_order_and_dedupes() {
        let merged = merge_tags(&["Elastic", "Windows"], &["Windows", "Custom", "Elastic"]);
        assert_eq!(merged, vec!["Elastic", "Windows", "Custom"]);
    }

    #[test]
    fn test_merge_trims_and_drops_empty() {
        let merged = merge_tags(&[" a ", ""], &["a", "  ", "b"]);
        assert_eq!(merged, vec!["a", "b"]);
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let merged = merge_tags(&["prod"], &["Prod"]);
        assert_eq!(merged, vec!["prod", "Prod"]);
    }

    #[test]
    fn test_missing_tags() {
        assert_eq!(missing_tags(&["a", "b"], &["b", "c", "c"]), vec!["c"]);
        assert!(missing_tags(&["a"], &["a", " a"]).is_empty());
    }
}
