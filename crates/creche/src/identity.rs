//! Deterministic child identity.
//!
//! A child's document key is derived from who registered them, what they are
//! called and when they were born:
//!
//! ```text
//! <parentId>__<normalized-name>__<YYYY-MM-DD>
//! ```
//!
//! The key doubles as the record's unique identifier, so a transactional
//! "create if absent" on that key is all it takes to keep duplicates out.
//! The delimiter and the normalization are part of every stored key; changing
//! either orphans existing records.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Separator between the parts of a derived key.
pub const KEY_DELIMITER: &str = "__";

/// Normalize a human-entered name into an ASCII slug.
///
/// Trims, lower-cases, strips accents, drops everything except `a-z`, `0-9`,
/// whitespace and `-`, then turns each run of whitespace and hyphens into a
/// single `-` with none at either end. Names that differ only in case,
/// accents, punctuation or spacing style share a slug; input with nothing
/// left after filtering yields `""`.
///
/// # Examples
///
/// ```
/// use creche::identity::normalize_name;
///
/// assert_eq!(normalize_name("  Jean   Luc  "), "jean-luc");
/// assert_eq!(normalize_name("Zoë O'Brien"), "zoe-obrien");
/// assert_eq!(normalize_name("!!!"), "");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_separator = false;

    for c in lowered.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_separator = true;
        }
    }

    slug
}

/// Derive the document key for a child.
///
/// Inputs are used as given: `parent_id` is assumed valid and
/// `date_of_birth` is assumed to already be `YYYY-MM-DD`. Two names with the
/// same slug ("Jean-Luc", "jean luc") are the same child.
///
/// # Examples
///
/// ```
/// use creche::identity::derive_child_key;
///
/// assert_eq!(
///     derive_child_key("P1", "Jean-Luc", "2020-05-15"),
///     "P1__jean-luc__2020-05-15"
/// );
/// ```
#[must_use]
pub fn derive_child_key(parent_id: &str, name: &str, date_of_birth: &str) -> String {
    format!(
        "{parent_id}{KEY_DELIMITER}{}{KEY_DELIMITER}{date_of_birth}",
        normalize_name(name)
    )
}
