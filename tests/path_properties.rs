//! Property tests for the path grammar.

use proptest::prelude::*;

use flexfs::paths;

/// Path segments drawn from a Windows-plausible alphabet (no separators,
/// no reserved punctuation).
fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ._-]{0,7}"
}

fn segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 0..4)
}

fn separator() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("\\"), Just("/")]
}

/// A grab bag of path shapes: relative, drive-relative, drive-absolute,
/// rooted, UNC, extended, device, and malformed prefixes.
fn any_path() -> impl Strategy<Value = String> {
    prop_oneof![
        segments().prop_map(|s| s.join("\\")),
        (segments(), separator()).prop_map(|(s, sep)| s.join(sep)),
        ("[C-Fc-f]", segments()).prop_map(|(d, s)| format!("{d}:{}", s.join("\\"))),
        ("[C-Fc-f]", segments(), separator())
            .prop_map(|(d, s, sep)| format!("{d}:{sep}{}", s.join(sep))),
        segments().prop_map(|s| format!("\\{}", s.join("\\"))),
        (segment(), segment(), segments())
            .prop_map(|(srv, share, s)| format!("\\\\{srv}\\{share}\\{}", s.join("\\"))),
        ("[C-Fc-f]", segments()).prop_map(|(d, s)| format!("\\\\?\\{d}:\\{}", s.join("\\"))),
        segments().prop_map(|s| format!("\\\\.\\pipe\\{}", s.join("\\"))),
        Just("\\\\".to_string()),
        Just("\\\\?".to_string()),
        Just("\\\\.".to_string()),
        Just("@:".to_string()),
        Just(String::new()),
    ]
}

/// Absolute shapes only.
fn qualified_path() -> impl Strategy<Value = String> {
    prop_oneof![
        ("[C-Fc-f]", segments()).prop_map(|(d, s)| format!("{d}:\\{}", s.join("\\"))),
        (segment(), segment(), segments())
            .prop_map(|(srv, share, s)| format!("\\\\{srv}\\{share}\\{}", s.join("\\"))),
        ("[C-Fc-f]", segments()).prop_map(|(d, s)| format!("\\\\?\\{d}:\\{}", s.join("\\"))),
        segments().prop_map(|s| format!("\\\\.\\pipe\\{}", s.join("\\"))),
    ]
}

fn trimmed_for_cover(path: &str) -> String {
    let normalized = paths::normalize_directory_separators(path).into_owned();
    let root_len = paths::get_root(&normalized).map(str::len).unwrap_or(0);
    let mut end = normalized.len();
    while end > root_len.max(1) && matches!(normalized.as_bytes()[end - 1], b'\\' | b'/') {
        end -= 1;
    }
    normalized[..end].to_string()
}

fn covered_by(path: &str, root: &str) -> bool {
    if path.len() < root.len()
        || !path.as_bytes()[..root.len()].eq_ignore_ascii_case(root.as_bytes())
    {
        return false;
    }
    path.len() == root.len()
        || root.ends_with('\\')
        || matches!(path.as_bytes()[root.len()], b'\\' | b'/')
}

proptest! {
    /// Classification ignores trailing whitespace when the path didn't end
    /// in a separator.
    #[test]
    fn prop_format_stable_under_trailing_space(p in any_path()) {
        prop_assume!(!p.is_empty() && !p.ends_with(['\\', '/']));
        prop_assert_eq!(
            paths::get_path_format(&p),
            paths::get_path_format(&format!("{p} "))
        );
    }

    /// Fully qualified paths are never partially qualified.
    #[test]
    fn prop_qualified_is_not_partial(p in qualified_path()) {
        prop_assert!(!paths::is_partially_qualified(&p));
    }

    /// Separator normalization settles in one pass.
    #[test]
    fn prop_normalize_idempotent(p in any_path()) {
        let once = paths::normalize_directory_separators(&p).into_owned();
        let twice = paths::normalize_directory_separators(&once).into_owned();
        prop_assert_eq!(once, twice);
    }

    /// Normalization never changes classification for non-device paths.
    #[test]
    fn prop_normalize_preserves_format(p in any_path()) {
        prop_assume!(!paths::is_device(&p));
        let normalized = paths::normalize_directory_separators(&p).into_owned();
        prop_assert_eq!(
            paths::get_path_format(&p),
            paths::get_path_format(&normalized)
        );
    }

    /// The extended prefix round-trips: adding it never loses the path
    /// body, and an already-prefixed path is left alone.
    #[test]
    fn prop_extended_prefix_is_stable(p in qualified_path()) {
        let prefixed = paths::add_extended_prefix(&p, true).into_owned();
        prop_assert!(paths::is_device(&prefixed));
        let again = paths::add_extended_prefix(&prefixed, true).into_owned();
        prop_assert_eq!(&again, &prefixed);
    }

    /// Every input is covered by exactly one returned root, and no root is
    /// a strict descendant of another.
    #[test]
    fn prop_common_roots_minimal_cover(
        inputs in prop::collection::vec(qualified_path(), 1..8)
    ) {
        let roots = paths::find_common_roots(&inputs);
        for input in &inputs {
            let covered = trimmed_for_cover(input);
            let count = roots.iter().filter(|r| covered_by(&covered, r)).count();
            prop_assert_eq!(count, 1, "input {:?} covered by {} roots ({:?})", input, count, roots);
        }
        for (i, a) in roots.iter().enumerate() {
            for (j, b) in roots.iter().enumerate() {
                if i != j {
                    prop_assert!(!covered_by(a, b), "root {:?} lies under root {:?}", a, b);
                }
            }
        }
    }

    /// `combine` inserts exactly one separator.
    #[test]
    fn prop_combine_single_separator(base in segment(), rel in segment()) {
        let joined = paths::combine(&base, Some(&rel));
        prop_assert_eq!(&joined, &format!("{base}\\{rel}"));
        let joined = paths::combine(&format!("{base}\\"), Some(&rel));
        prop_assert_eq!(&joined, &format!("{base}\\{rel}"));
    }
}
