//! Single-segment filename sanitizing.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Longest filename most filesystems accept.
pub const MAX_FILENAME_LEN: usize = 255;

/// Last-resort name when both the input and the default are unusable.
const FALLBACK_NAME: &str = "file";

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static pattern"))
}

/// Reduce `raw` to a name that is safe as one path segment.
///
/// Directory components are dropped, every character outside
/// `[A-Za-z0-9_.-]` becomes `_`, and names that end up empty or start with
/// `.` are replaced by `default`. The result is at most 255 characters.
pub fn sanitize_filename(raw: &str, default: &str) -> String {
    clean(raw)
        .or_else(|| clean(default))
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

fn clean(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let safe = unsafe_chars().replace_all(base, "_");
    if safe.is_empty() || safe.starts_with('.') {
        return None;
    }
    Some(safe.chars().take(MAX_FILENAME_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_safe(name: &str) {
        assert!(!name.is_empty());
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert!(!name.starts_with('.'));
        assert!(name.chars().count() <= MAX_FILENAME_LEN);
    }

    #[test]
    fn test_plain_name_unchanged() {
        assert_eq!(sanitize_filename("fmj_render-01.png", "image"), "fmj_render-01.png");
    }

    #[test]
    fn test_directory_components_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd", "image"), "passwd");
        assert_eq!(sanitize_filename("C:\\Windows\\win.ini", "image"), "win.ini");
    }

    #[test]
    fn test_disallowed_characters_replaced() {
        assert_eq!(sanitize_filename("my image (1).png", "image"), "my_image__1_.png");
        assert_eq!(sanitize_filename("café", "image"), "caf_");
    }

    #[test]
    fn test_default_used_for_empty_and_hidden() {
        assert_eq!(sanitize_filename("", "fmj"), "fmj");
        assert_eq!(sanitize_filename("..", "fmj"), "fmj");
        assert_eq!(sanitize_filename(".bashrc", "fmj"), "fmj");
        assert_eq!(sanitize_filename("dir/", "fmj"), "fmj");
    }

    #[test]
    fn test_only_disallowed_characters() {
        let name = sanitize_filename("$$$", "fmj");
        assert_eq!(name, "___");
        assert_safe(&name);
    }

    #[test]
    fn test_truncated_to_limit() {
        let long = "a".repeat(1000);
        assert_eq!(sanitize_filename(&long, "fmj").len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn test_unusable_default_falls_back() {
        assert_eq!(sanitize_filename("", ""), FALLBACK_NAME);
        assert_eq!(sanitize_filename("..", "../.."), FALLBACK_NAME);
    }

    #[test]
    fn test_hostile_inputs_always_safe() {
        let inputs = [
            "",
            ".",
            "..",
            "../../../",
            "/",
            "\\\\server\\share\\..",
            "..\\..\\x",
            "\0\n\t",
            "🙂🙂🙂",
            ".hidden/visible",
            "a/b/.c",
        ];
        for input in inputs {
            assert_safe(&sanitize_filename(input, "image"));
        }
    }
}
