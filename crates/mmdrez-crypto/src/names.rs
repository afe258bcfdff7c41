//! Stored filename handling
//!
//! The name inside a container is attacker-controlled once the file leaves
//! the sender. Only its final path component is ever used to build an
//! output path.

/// Used when the stored name has no usable final component.
pub const FALLBACK_NAME: &str = "decrypted.bin";

/// Strip every directory component from a stored filename.
///
/// Both `/` and `\` are separators regardless of platform, and a drive prefix
/// (`C:`) is dropped. Names that reduce to nothing, `.` or `..` become
/// [`FALLBACK_NAME`].
pub fn sanitize_file_name(raw: &str) -> String {
    let last = raw
        .rsplit(|c: char| matches!(c, '/' | '\\' | ':'))
        .next()
        .unwrap_or_default()
        .trim_matches('\0');

    match last {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        name => name.to_string(),
    }
}
