//! Folder and file naming grammar.
//!
//! Title folders may carry an explicit creation date as `{YYYY-MM-DD}`; book
//! files may start with a `[LANG]` group and end with a `[flag, flag]` group:
//!
//! ```text
//! Some Title {2020-01-15}/
//!     [EN] Some Title Vol.1 [Uncensored, Waifu2x].cbz
//! ```
//!
//! Nothing in here fails: a malformed annotation is treated as absent.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::TitleFlags;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Creation date encoded in the last `{...}` group of a title folder name.
pub fn parse_created_at(folder_name: &str) -> Option<DateTime<Utc>> {
    let open = folder_name.rfind('{')?;
    let close = folder_name.rfind('}')?;
    if close <= open {
        return None;
    }
    let segment = &folder_name[open + 1..close];
    if !is_date_shaped(segment) {
        return None;
    }
    let date = NaiveDate::parse_from_str(segment, DATE_FORMAT).ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Exactly `DDDD-DD-DD`: chrono alone accepts signs, padding and short fields.
fn is_date_shaped(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Flags from the trailing `[...]` group of a book base name.
///
/// A group starting at position 0 is the language tag, not a flag list.
pub fn parse_flags(book_name: &str) -> TitleFlags {
    let mut flags = TitleFlags::default();
    let Some(inner) = book_name.strip_suffix(']') else {
        return flags;
    };
    let open = match inner.rfind('[') {
        Some(i) if i > 0 => i,
        _ => return flags,
    };
    for token in inner[open + 1..].split(',').map(str::trim) {
        match token {
            "Uncensored" | "Decensored" => flags.uncensored = true,
            "Waifu2x" => flags.waifu2x = true,
            _ => {}
        }
    }
    flags
}

/// Language code from a leading `[...]` group, if any.
///
/// The group content is taken verbatim; only an empty group counts as absent.
pub fn parse_lang(book_name: &str) -> Option<&str> {
    let rest = book_name.strip_prefix('[')?;
    let close = rest.find(']')?;
    let lang = &rest[..close];
    if lang.is_empty() {
        None
    } else {
        Some(lang)
    }
}

/// Sorted, de-duplicated, comma-joined language codes of a title's books.
pub fn join_langs<'a, I>(book_names: I, fallback: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let langs: BTreeSet<&str> =
        book_names.into_iter().map(|name| parse_lang(name).unwrap_or(fallback)).collect();
    langs.into_iter().collect::<Vec<_>>().join(",")
}

/// OR-aggregates the flags of every book name.
pub fn aggregate_flags<'a, I>(book_names: I) -> TitleFlags
where
    I: IntoIterator<Item = &'a str>,
{
    book_names.into_iter().map(parse_flags).fold(TitleFlags::default(), TitleFlags::merge)
}
