//! Filename sanitization for user-supplied names.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Name used when nothing usable is left after sanitization.
pub const PLACEHOLDER_NAME: &str = "unnamed_file";

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f]").expect("valid control character pattern"));

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const TRANSLITERATIONS: &[(char, char)] = &[
    ('ı', 'i'),
    ('ğ', 'g'),
    ('ü', 'u'),
    ('ş', 's'),
    ('ö', 'o'),
    ('ç', 'c'),
    ('İ', 'I'),
    ('Ğ', 'G'),
    ('Ü', 'U'),
    ('Ş', 'S'),
    ('Ö', 'O'),
    ('Ç', 'C'),
];

/// Returns a filesystem-safe file name.
///
/// Keeps only the last path component, strips control characters and
/// `<>:"|?*`, transliterates Turkish letters to ASCII, replaces spaces with
/// underscores and collapses runs of dots.
pub fn clean_filename(raw: &str) -> String {
    if raw.is_empty() {
        return PLACEHOLDER_NAME.to_string();
    }

    let normalized = raw.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default();

    let stripped = CONTROL_CHARS.replace_all(base, "");

    let mut name: String = stripped
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .map(|c| {
            TRANSLITERATIONS
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();

    while name.contains("..") {
        name = name.replace("..", ".");
    }

    if name.is_empty() || name == "." {
        return PLACEHOLDER_NAME.to_string();
    }

    name
}
