//! Sanitisation of externally supplied names and values.
//!
//! This is a security and portability boundary, not cosmetics: every
//! identifier derived from source-file data must pass [`object_name`] or
//! [`file_name`]/[`path_safe`] before being interpolated into a storage
//! statement or used as a path, and every string value written to a
//! backend must pass [`weak`].

/// Maximum byte length of a sanitised object name.
pub const OBJECT_NAME_MAX_BYTES: usize = 256;

/// Names that cannot be used as plain file names on Windows filesystems.
const RESERVED_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Strip everything except letters, digits, commas and whitespace,
/// replacing stripped characters with a space.
pub fn vigorous(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ',' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Remove characters that break quoting or string literals (quotes,
/// semicolons, parentheses, equals), replacing each with a space.
pub fn weak(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '"' | '\'' | ';' | '(' | ')' | '=' => ' ',
            other => other,
        })
        .collect()
}

/// Coerce a string into a safe storage-object identifier.
///
/// Uppercases, strips everything outside `[A-Z0-9#@$]`, prefixes with a
/// letter when the result would start illegally (leading non-letter, the
/// `II` escaping-convention collision, or a reserved device name), and
/// truncates to [`OBJECT_NAME_MAX_BYTES`]. Idempotent.
pub fn object_name(input: &str) -> String {
    let mut out: String = input
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '#' | '@' | '$'))
        .collect();

    if out.starts_with("II")
        || RESERVED_DEVICE_NAMES.contains(&out.as_str())
        || !out.chars().next().map_or(false, |c| c.is_ascii_uppercase())
    {
        out.insert(0, 'A');
    }

    // Everything left is single-byte ASCII, so byte truncation is safe.
    out.truncate(OBJECT_NAME_MAX_BYTES);
    out
}

/// Remove characters illegal in directory paths, leaving separators (and
/// drive colons) intact.
pub fn path_safe(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '<' | '>' | '"' | '|' | '?' | '*' => '-',
            other => other,
        })
        .collect()
}

/// Coerce a string into a portable bare file name: no separators, no
/// trailing dots or spaces, and reserved device names prefixed.
pub fn file_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ' ']).to_string();

    if RESERVED_DEVICE_NAMES.contains(&cleaned.to_uppercase().as_str()) {
        format!("Data-{}", cleaned)
    } else {
        cleaned
    }
}
