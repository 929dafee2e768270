//! Windows path grammar: classification, normalization, and combination.
//!
//! Everything in this module is pure string manipulation — no OS calls, no
//! allocation unless the result actually differs from the input. Paths are
//! treated as opaque `&str`s; `/` and `\` are interchangeable for
//! classification, but device and extended-length prefixes are
//! separator-sensitive and are passed through untouched.

use std::borrow::Cow;

/// Longest path the legacy (non `\\?\`) Win32 APIs accept, including the
/// terminating NUL.
pub const MAX_LEGACY_PATH_LENGTH: usize = 260;

/// The shape of a path string, determined purely by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathFormat {
    /// Doesn't fit any recognized grammar (empty, `\\?`, a bare colon, ...).
    Unknown,
    /// Qualified to a drive but relative to its current directory (`C:foo`).
    DriveRooted,
    /// Absolute local path, including extended-length and device forms
    /// (`C:\foo`, `\\?\C:\foo`, `\\.\pipe\name`).
    FullyQualified,
    /// Rooted on the current drive (`\foo`).
    CurrentDriveRooted,
    /// Relative to the current directory (`foo`).
    CurrentDirectoryRelative,
    /// UNC share path, plain or extended (`\\server\share`, `\\?\UNC\server\share`).
    Unc,
}

#[inline]
fn is_sep(b: u8) -> bool {
    b == b'\\' || b == b'/'
}

/// True for device-namespace prefixes: `\\.\`, `\\?\`, `\??\` and the
/// forward-slash spellings of the first two.
pub fn is_device(path: &str) -> bool {
    let b = path.as_bytes();
    if b.len() < 4 {
        return false;
    }
    (is_sep(b[0]) && is_sep(b[1]) && (b[2] == b'?' || b[2] == b'.') && is_sep(b[3]))
        || (is_sep(b[0]) && b[1] == b'?' && b[2] == b'?' && is_sep(b[3]))
}

/// True for extended-length prefixes only: literal `\\?\` or `\??\`.
///
/// Narrower than [`is_device`]: `\\.\` paths are device paths but not
/// extended, and forward-slash spellings don't qualify (the OS treats the
/// extended prefix literally).
pub fn is_extended(path: &str) -> bool {
    let b = path.as_bytes();
    if b.len() < 4 {
        return false;
    }
    (b[0] == b'\\' && b[1] == b'\\' && b[2] == b'?' && b[3] == b'\\')
        || (b[0] == b'\\' && b[1] == b'?' && b[2] == b'?' && b[3] == b'\\')
}

fn has_extended_unc_tail(path: &str) -> bool {
    // Tail after a 4-byte extended prefix: "UNC" + separator.
    let b = path.as_bytes();
    b.len() >= 8 && b[4..7].eq_ignore_ascii_case(b"UNC") && is_sep(b[7])
}

/// Classify a path by prefix inspection alone.
///
/// Trailing content never changes the classification; malformed prefixes
/// (`\\`, `\\?`, `\\.`, a non-letter drive spec, a leading colon) classify
/// as [`PathFormat::Unknown`] rather than failing.
pub fn get_path_format(path: &str) -> PathFormat {
    let b = path.as_bytes();
    if b.is_empty() {
        return PathFormat::Unknown;
    }
    if is_sep(b[0]) {
        if b.len() == 1 {
            return PathFormat::CurrentDriveRooted;
        }
        if is_sep(b[1]) {
            if b.len() == 2 {
                return PathFormat::Unknown;
            }
            if b[2] == b'?' || b[2] == b'.' {
                // Device or extended prefix; incomplete forms are unknown.
                if b.len() < 5 || !is_sep(b[3]) {
                    return PathFormat::Unknown;
                }
                if b[2] == b'?' && has_extended_unc_tail(path) {
                    return PathFormat::Unc;
                }
                return PathFormat::FullyQualified;
            }
            return PathFormat::Unc;
        }
        if b[1] == b'?' && b.len() >= 4 && b[2] == b'?' && is_sep(b[3]) {
            // NT object namespace (\??\...).
            if b.len() == 4 {
                return PathFormat::Unknown;
            }
            if has_extended_unc_tail(path) {
                return PathFormat::Unc;
            }
            return PathFormat::FullyQualified;
        }
        return PathFormat::CurrentDriveRooted;
    }
    if b[0] == b':' {
        return PathFormat::Unknown;
    }
    if b.len() >= 2 && b[1] == b':' {
        if !b[0].is_ascii_alphabetic() {
            return PathFormat::Unknown;
        }
        if b.len() == 2 {
            return PathFormat::DriveRooted;
        }
        if is_sep(b[2]) {
            return PathFormat::FullyQualified;
        }
        return PathFormat::DriveRooted;
    }
    PathFormat::CurrentDirectoryRelative
}

/// True when the path is relative to something: the current directory, the
/// current drive, or a drive's current directory. Empty and unrecognized
/// inputs count as partially qualified.
pub fn is_partially_qualified(path: &str) -> bool {
    matches!(
        get_path_format(path),
        PathFormat::Unknown
            | PathFormat::DriveRooted
            | PathFormat::CurrentDriveRooted
            | PathFormat::CurrentDirectoryRelative
    )
}

/// Extract the minimal root prefix of a path.
///
/// Returns `None` for inputs with no well-defined root (malformed UNC, bare
/// colon, unrecognized prefixes). A current-directory-relative path has the
/// valid empty root `Some("")` — distinct from `None`.
pub fn get_root(path: &str) -> Option<&str> {
    let b = path.as_bytes();
    match get_path_format(path) {
        PathFormat::Unknown => None,
        PathFormat::CurrentDirectoryRelative => Some(""),
        PathFormat::CurrentDriveRooted => Some(&path[..1]),
        PathFormat::DriveRooted => Some(&path[..2]),
        PathFormat::FullyQualified => {
            if is_device(path) {
                // \\?\C:\foo → \\?\C:\ ; \\.\pipe\name → \\.\pipe\
                let mut end = 4;
                while end < b.len() && !is_sep(b[end]) {
                    end += 1;
                }
                if end == 4 {
                    return None;
                }
                if end < b.len() {
                    end += 1;
                }
                Some(&path[..end])
            } else {
                Some(&path[..3])
            }
        }
        PathFormat::Unc => {
            // \\server\share or \\?\UNC\server\share; both segments must be
            // present and non-empty for the root to be well-defined.
            let start = if is_device(path) { 8 } else { 2 };
            let mut i = start;
            while i < b.len() && !is_sep(b[i]) {
                i += 1;
            }
            if i == start || i >= b.len() {
                return None;
            }
            i += 1;
            let share_start = i;
            while i < b.len() && !is_sep(b[i]) {
                i += 1;
            }
            if i == share_start {
                return None;
            }
            Some(&path[..i])
        }
    }
}

/// The directory portion of a path: everything before the final segment.
///
/// `None` when the input is malformed or is nothing but a root
/// (`get_directory("C:\\")` has no parent to name).
pub fn get_directory(path: &str) -> Option<&str> {
    let root = get_root(path)?;
    let b = path.as_bytes();
    let mut end = path.len();
    while end > root.len() && is_sep(b[end - 1]) {
        end -= 1;
    }
    if end == root.len() {
        return None;
    }
    let mut i = end;
    while i > root.len() && !is_sep(b[i - 1]) {
        i -= 1;
    }
    if i == root.len() {
        return Some(root);
    }
    Some(&path[..(i - 1).max(root.len())])
}

/// The final segment of a path, ignoring any trailing separator.
///
/// `None` when the input is malformed or consists only of a root.
pub fn get_file_or_directory_name(path: &str) -> Option<&str> {
    let root = get_root(path)?;
    let b = path.as_bytes();
    let mut end = path.len();
    while end > root.len() && is_sep(b[end - 1]) {
        end -= 1;
    }
    if end == root.len() {
        return None;
    }
    let mut start = end;
    while start > root.len() && !is_sep(b[start - 1]) {
        start -= 1;
    }
    Some(&path[start..end])
}

/// The extension of the final segment, dot included; empty when the segment
/// has none or ends in a dot.
pub fn get_extension(path: &str) -> &str {
    let name = match get_file_or_directory_name(path) {
        Some(name) => name,
        None => return "",
    };
    match name.rfind('.') {
        Some(i) if i + 1 < name.len() => &name[i..],
        _ => "",
    }
}

/// Join a relative component onto a base path with exactly one separator.
///
/// A missing or empty relative component yields the base unchanged; a base
/// that already ends in a separator never gets a second one.
pub fn combine(base: &str, relative: Option<&str>) -> String {
    let relative = relative.unwrap_or("");
    if relative.is_empty() {
        return base.to_owned();
    }
    if base.is_empty() {
        return relative.to_owned();
    }
    if is_sep(base.as_bytes()[base.len() - 1]) {
        format!("{base}{relative}")
    } else {
        format!("{base}\\{relative}")
    }
}

/// Collapse runs of mixed `/`/`\` separators into single `\`s, preserving a
/// leading double separator (the UNC marker) as exactly two.
///
/// Device and extended-length paths are separator-sensitive by OS contract
/// and pass through untouched. Returns `Cow::Borrowed` whenever no change
/// is needed, so callers get a no-op fast path.
pub fn normalize_directory_separators(path: &str) -> Cow<'_, str> {
    if path.is_empty() || is_device(path) {
        return Cow::Borrowed(path);
    }
    let b = path.as_bytes();
    let mut needs_change = false;
    let mut prev_sep = false;
    for (i, &c) in b.iter().enumerate() {
        if c == b'/' {
            needs_change = true;
            break;
        }
        if c == b'\\' {
            if prev_sep && i != 1 {
                needs_change = true;
                break;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
    }
    if !needs_change {
        return Cow::Borrowed(path);
    }
    let mut out = String::with_capacity(path.len());
    let mut prev_sep = false;
    for (i, c) in path.char_indices() {
        if c == '\\' || c == '/' {
            if !prev_sep || i == 1 {
                out.push('\\');
            }
            prev_sep = true;
        } else {
            out.push(c);
            prev_sep = false;
        }
    }
    Cow::Owned(out)
}

/// Prefix a path with `\\?\` (or `\\?\UNC\` for share paths) to reach the
/// extended-length Win32 namespace.
///
/// Device and extended paths are returned unchanged. Unless
/// `add_if_under_max_path` is set, paths short enough for the legacy APIs
/// are also returned unchanged; forcing the prefix is required before
/// creating or deleting names the legacy normalization would mangle
/// (trailing dots or spaces).
pub fn add_extended_prefix(path: &str, add_if_under_max_path: bool) -> Cow<'_, str> {
    if is_device(path) {
        return Cow::Borrowed(path);
    }
    if !add_if_under_max_path && path.len() < MAX_LEGACY_PATH_LENGTH {
        return Cow::Borrowed(path);
    }
    if get_path_format(path) == PathFormat::Unc {
        Cow::Owned(format!(r"\\?\UNC\{}", &path[2..]))
    } else {
        Cow::Owned(format!(r"\\?\{path}"))
    }
}

/// Re-apply the volume-identifying prefix spelling of `source` to `target`.
///
/// The OS returns resolved paths with a canonical (upper-cased, extended)
/// root; callers want their own drive spelling back. The extended prefix is
/// stripped from `target` when `source` isn't extended, then the source root
/// replaces a case-insensitively equal target root. Everything after the
/// root is returned exactly as the OS produced it.
pub fn replace_casing(source: &str, target: &str) -> String {
    let stripped: Cow<'_, str> = if is_extended(target) && !is_extended(source) {
        let tail = &target[4..];
        if has_extended_unc_tail(target) {
            Cow::Owned(format!(r"\\{}", &tail[4..]))
        } else {
            Cow::Borrowed(tail)
        }
    } else {
        Cow::Borrowed(target)
    };
    let source_root_len = match get_root(source) {
        Some(root) if !root.is_empty() => root.len(),
        _ => return stripped.into_owned(),
    };
    let target_root_len = match get_root(&stripped) {
        Some(root) => root.len(),
        None => return stripped.into_owned(),
    };
    if source_root_len == target_root_len
        && source[..source_root_len].eq_ignore_ascii_case(&stripped[..target_root_len])
    {
        format!("{}{}", &source[..source_root_len], &stripped[target_root_len..])
    } else {
        stripped.into_owned()
    }
}

fn is_same_or_descendant(path: &str, root: &str) -> bool {
    if path.len() < root.len()
        || !path.as_bytes()[..root.len()].eq_ignore_ascii_case(root.as_bytes())
    {
        return false;
    }
    if path.len() == root.len() {
        return true;
    }
    root.ends_with(['\\', '/']) || is_sep(path.as_bytes()[root.len()])
}

/// Reduce a collection of paths to the minimal set of covering roots: every
/// input is under exactly one returned root, and no returned root is a
/// strict descendant of another.
///
/// Comparison is case-insensitive and segment-aware (`C:\foo` does not
/// cover `C:\foobar`).
pub fn find_common_roots<I>(paths: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut candidates: Vec<String> = Vec::new();
    for path in paths {
        let mut normalized = normalize_directory_separators(path.as_ref()).into_owned();
        let root_len = get_root(&normalized).map(str::len).unwrap_or(0);
        let mut end = normalized.len();
        while end > root_len.max(1) && is_sep(normalized.as_bytes()[end - 1]) {
            end -= 1;
        }
        normalized.truncate(end);
        candidates.push(normalized);
    }
    candidates.sort_by_key(|c| c.to_ascii_lowercase());
    let mut roots: Vec<String> = Vec::new();
    for candidate in candidates {
        if !roots.iter().any(|root| is_same_or_descendant(&candidate, root)) {
            roots.push(candidate);
        }
    }
    roots
}

/// Match a name against a DOS-style wildcard pattern (`*` any run, `?` one
/// character), case-insensitively. An empty pattern or `*` matches anything.
pub fn matches_dos_pattern(name: &str, pattern: &str) -> bool {
    if pattern.is_empty() || pattern == "*" || pattern == "*.*" {
        return true;
    }
    let name: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let (mut ni, mut pi) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ni < name.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == name[ni]) {
            ni += 1;
            pi += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}
