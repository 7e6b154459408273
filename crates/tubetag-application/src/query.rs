// SPDX-License-Identifier: GPL-3.0-or-later

//! Text cleanup for raw titles and candidate titles.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub(crate) const SEGMENT_SEPARATOR: &str = " - ";

lazy_static! {
    // Bracketed video annotations such as "(Official Video)", "[4K Remaster]", "(Lyric Video)".
    static ref VIDEO_ANNOTATION: Regex = Regex::new(
        r"(?i)\s*[\(\[][^\)\]]*\b(official|video|audio|lyrics?|visualizer|remaster(ed)?|4k|hd|hq|mv|animated)\b[^\)\]]*[\)\]]"
    ).unwrap();

    // Discogs disambiguation suffixes such as "Artist (2)".
    static ref NUMERIC_ANNOTATION: Regex = Regex::new(r"\(([0-9)]*)\)").unwrap();

    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// Turn a file name or video title into the query text every candidate is scored against.
///
/// Strips a trailing file extension and bracketed video annotations, then collapses whitespace.
pub fn clean_raw_title(raw: &str) -> String {
    let without_extension = strip_extension(raw.trim());
    let without_junk = VIDEO_ANNOTATION.replace_all(without_extension, "");
    WHITESPACE_RUN
        .replace_all(&without_junk, " ")
        .trim()
        .to_string()
}

/// Remove numeric parenthesized annotations from a candidate title and close the gap they leave.
pub fn clean_candidate_title(title: &str) -> String {
    NUMERIC_ANNOTATION
        .replace_all(title, "")
        .replace("  ", " ")
        .trim()
        .to_string()
}

/// First `" - "` segment, or the whole string when there is no separator.
pub fn first_segment(value: &str) -> Option<&str> {
    value
        .split(SEGMENT_SEPARATOR)
        .find(|segment| !segment.is_empty())
        .map(str::trim)
}

/// Last `" - "` segment, or the whole string when there is no separator.
pub fn last_segment(value: &str) -> Option<&str> {
    value
        .split(SEGMENT_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::trim)
}

/// Split an artist credit into performers: commas first, then the literal word `" And "`.
pub fn split_performers(artist: &str) -> Vec<String> {
    let mut parts: Vec<&str> = artist.split(',').filter(|part| !part.is_empty()).collect();
    if parts.len() < 2 {
        parts = artist.split(" And ").filter(|part| !part.is_empty()).collect();
    }
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip combining marks (NFD, drop marks, NFC) and lowercase.
pub fn fold_diacritics(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect::<String>()
        .to_lowercase()
}

/// Case-insensitive, diacritic-insensitive substring test. An empty needle is always contained.
pub fn contains_diacritic_free(haystack: &str, needle: &str) -> bool {
    let needle = fold_diacritics(needle);
    needle.is_empty() || fold_diacritics(haystack).contains(&needle)
}

fn strip_extension(value: &str) -> &str {
    let Some(extension) = Path::new(value).extension().and_then(|ext| ext.to_str()) else {
        return value;
    };
    // "Mr. Brightside" has no extension, "track.mp3" does.
    let looks_like_extension = !extension.is_empty()
        && extension.len() <= 5
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    if looks_like_extension {
        &value[..value.len() - extension.len() - 1]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_title_drops_extension_and_video_junk() {
        assert_eq!(
            clean_raw_title("Rick Astley - Never Gonna Give You Up (Official Video) (4K Remaster).mp3"),
            "Rick Astley - Never Gonna Give You Up"
        );
        assert_eq!(
            clean_raw_title("Daft Punk - Around The World [Official Music Video].ogg"),
            "Daft Punk - Around The World"
        );
    }

    #[test]
    fn raw_title_keeps_meaningful_brackets_and_dots() {
        assert_eq!(
            clean_raw_title("The Killers - Mr. Brightside"),
            "The Killers - Mr. Brightside"
        );
        assert_eq!(
            clean_raw_title("Queen - Bohemian Rhapsody (Live Aid 1985).wav"),
            "Queen - Bohemian Rhapsody (Live Aid 1985)"
        );
    }

    #[test]
    fn candidate_title_loses_numeric_annotations() {
        assert_eq!(
            clean_candidate_title("Nirvana (2) - Smells Like Teen Spirit"),
            "Nirvana - Smells Like Teen Spirit"
        );
        assert_eq!(clean_candidate_title("Discovery (Album)"), "Discovery (Album)");
    }

    #[test]
    fn segments() {
        assert_eq!(first_segment("Daft Punk - One More Time"), Some("Daft Punk"));
        assert_eq!(last_segment("Daft Punk - One More Time"), Some("One More Time"));
        assert_eq!(last_segment("Discovery"), Some("Discovery"));
        assert_eq!(first_segment(""), None);
    }

    #[test]
    fn performers_split_on_commas_then_and() {
        assert_eq!(
            split_performers("Simon & Garfunkel, Paul Simon"),
            vec!["Simon & Garfunkel", "Paul Simon"]
        );
        assert_eq!(
            split_performers("Daryl Hall And John Oates"),
            vec!["Daryl Hall", "John Oates"]
        );
        assert_eq!(split_performers("Rick Astley"), vec!["Rick Astley"]);
    }

    #[test]
    fn containment_ignores_case_and_diacritics() {
        assert!(contains_diacritic_free("ONE MORE TIME - DAFT PUNK", "Daft Punk"));
        assert!(contains_diacritic_free("Beyoncé - Halo", "beyonce"));
        assert!(contains_diacritic_free("Sigur Ros - Hoppipolla", "Sigur Rós"));
        assert!(!contains_diacritic_free("Daft Punk - Digital Love", "One More Time"));
        assert!(contains_diacritic_free("anything", ""));
    }
}
