use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Builds the `<username>_<title>_<key>` slug used for media file names.
pub fn song_slug(username: &str, title: &str, key: &str) -> String {
    [slugify(username), slugify(title), key_slug(key)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// ASCII-folds and lowercases `text`, collapsing anything else into single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.nfkd() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if !is_combining_mark(c) {
            pending_dash = true;
        }
    }

    slug
}

/// Reversible file-name form of a key. Case, ASCII alphanumerics and `_` are kept,
/// `-` becomes `--` and every other byte becomes `-XX` (uppercase hex).
fn key_slug(key: &str) -> String {
    let mut slug = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'-' => slug.push_str("--"),
            b if b.is_ascii_alphanumeric() || b == b'_' => slug.push(b as char),
            b => slug.push_str(&format!("-{:02X}", b)),
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_slug_scenario() {
        assert_eq!(song_slug("alice", "My Song", "k1"), "alice_my-song_k1");
    }

    #[test]
    fn test_slug_is_idempotent() {
        let first = song_slug("Bob", "Ça va? (Live!)", "123_456");
        let second = song_slug("Bob", "Ça va? (Live!)", "123_456");
        assert_eq!(first, second);
        assert_eq!(first, "bob_ca-va-live_123_456");
    }

    #[test]
    fn test_distinct_keys_give_distinct_slugs() {
        assert_ne!(
            song_slug("alice", "My Song", "k1"),
            song_slug("alice", "My Song", "k2")
        );
        assert_ne!(
            song_slug("alice", "My Song", "Ab1"),
            song_slug("alice", "My Song", "ab1")
        );
    }

    #[test]
    fn test_keys_differing_in_punctuation_stay_distinct() {
        let keys = ["k.1", "k/1", "k 1", "k-1", "k--1", "k-2E1", "k_1", "k1 "];
        let slugs: std::collections::HashSet<String> = keys
            .iter()
            .map(|key| song_slug("alice", "My Song", key))
            .collect();
        assert_eq!(slugs.len(), keys.len());

        assert_eq!(key_slug("k.1"), "k-2E1");
        assert_eq!(key_slug("k-2E1"), "k--2E1");
        assert_eq!(key_slug("k/1"), "k-2F1");
    }

    #[test]
    fn test_key_slug_is_file_name_safe() {
        let slug = key_slug("a/b\\c:d é");
        assert!(slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn test_empty_components_are_skipped() {
        assert_eq!(song_slug("alice", "***", "k1"), "alice_k1");
        assert_eq!(slugify("  --  "), "");
    }
}
