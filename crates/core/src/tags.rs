//! Cache tag normalisation and `@tags` annotation parsing.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static tag pattern"));

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@tags\s*([a-zA-Z0-9, ()_].*)").expect("static tag pattern"));

static DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\-_:.]+").expect("static tag pattern"));

/// Lowercase, trim and collapse every run of non-alphanumerics to `_`.
pub fn normalize(tag: &str) -> String {
    let lower = tag.trim().to_lowercase();
    NON_ALNUM.replace_all(&lower, "_").trim_matches('_').to_string()
}

/// Normalise each tag, dropping empties and keeping the first of duplicates.
pub fn normalize_all<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| normalize(t.as_ref()))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Raw tags listed on an `@tags` line, e.g. `@tags users, teams|billing`.
///
/// Returns `None` when no annotation is present.
pub fn parse_annotation(text: &str) -> Option<Vec<String>> {
    let captures = ANNOTATION.captures(text)?;
    let list = captures.get(1)?.as_str();
    Some(
        DELIMITER
            .split(list)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("  User Accounts "), "user_accounts");
        assert_eq!(normalize("teams::billing"), "teams_billing");
        assert_eq!(normalize("--Orders--"), "orders");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn normalize_all_deduplicates_in_order() {
        let tags = normalize_all(["Users", "teams", "users", " USERS ", "", "Teams"]);
        assert_eq!(tags, vec!["users", "teams"]);
    }

    #[test]
    fn annotation_is_split_on_delimiters() {
        let doc = "Update a user.\n@tags users, user-profiles | billing\n";
        let tags = parse_annotation(doc).unwrap();
        assert_eq!(tags, vec!["users", "user-profiles", "billing"]);
        assert_eq!(normalize_all(tags), vec!["users", "user_profiles", "billing"]);
    }

    #[test]
    fn missing_annotation_is_none() {
        assert!(parse_annotation("no tags here").is_none());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Normalised tags only hold `[a-z0-9_]` and never start or end with `_`.
            #[test]
            fn normalized_tags_are_clean(tag in "\\PC{0,32}") {
                let tag = normalize(&tag);
                prop_assert!(tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
                prop_assert!(!tag.starts_with('_') && !tag.ends_with('_'));
                prop_assert_eq!(normalize(&tag), tag.clone());
            }

            #[test]
            fn normalize_all_has_no_duplicates(tags in proptest::collection::vec("[A-Za-z _-]{0,8}", 0..12)) {
                let normalized = normalize_all(&tags);
                let unique: HashSet<_> = normalized.iter().collect();
                prop_assert_eq!(unique.len(), normalized.len());
            }
        }
    }
}
