//! Attribute name ↔ file name conventions.
//!
//! Folder names stay as-is, file names are snake_case, and the construct a
//! script file defines is the CamelCase form of its stem:
//! `models/text_encoder.rhai` defines `TextEncoder` and answers both
//! `models.text_encoder` and `models.TextEncoder`.

/// Convert a CamelCase name to its snake_case file stem.
///
/// An underscore goes before every uppercase letter except the first.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Convert a snake_case stem to the CamelCase construct name.
pub fn snake_to_camel(stem: &str) -> String {
    stem.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Returns true if `name` may be looked up as a namespace member.
///
/// Rejects anything that could walk out of the directory or reach a hidden
/// or reserved entry.
pub fn is_member_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with("__")
        && !name.contains(['/', '\\', '\0'])
}

/// Returns true if a directory entry is hidden from resolution and listing.
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name.starts_with("__")
}

/// Split a file name into its stem and lower-cased extension.
///
/// Only the last extension counts: `weights.tar.gz` is stem `weights.tar`,
/// extension `gz`.
pub fn split_file_name(file_name: &str) -> (&str, Option<String>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            (stem, Some(ext.to_ascii_lowercase()))
        }
        _ => (file_name, None),
    }
}

/// Normalize a user-supplied extension: no leading dot, lower case.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}
