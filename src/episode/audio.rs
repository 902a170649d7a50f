// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

/// Length of a `YYYY-MM-DD` date embedded in a filename
const DATE_PATTERN_LEN: usize = 10;

/// Get the lowercased audio extension of a filename, if it is a recognized one
pub fn get_audio_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| is_valid_audio_extension(ext))
}

/// Check if a filename carries a recognized audio extension
pub fn is_audio_file(filename: &str) -> bool {
    get_audio_extension(filename).is_some()
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

/// Map an audio filename to the MIME type used for uploads and feed enclosures
///
/// Unknown extensions fall back to "audio/mpeg".
pub fn content_type_for(filename: &str) -> &'static str {
    match get_audio_extension(filename).as_deref() {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("ogg") => "audio/ogg",
        Some("opus") => "audio/opus",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        _ => "audio/mpeg",
    }
}

/// Find the first `YYYY-MM-DD` date in a filename
///
/// Both zero-padded and single-digit days are accepted ("2021-03-07", "2021-03-7").
/// The month is always two digits.
pub fn parse_publish_date(filename: &str) -> Option<DateTime<Utc>> {
    let bytes = filename.as_bytes();

    (0..bytes.len()).find_map(|start| {
        if !bytes[start].is_ascii_digit() || (start > 0 && bytes[start - 1].is_ascii_digit()) {
            return None;
        }
        let end = (start + DATE_PATTERN_LEN).min(bytes.len());
        let candidate = filename.get(start..end)?;
        parse_date_prefix(candidate)
    })
}

fn parse_date_prefix(candidate: &str) -> Option<DateTime<Utc>> {
    // Full-width date first, then the short-day form ("2021-03-7x")
    let forms = [candidate, candidate.get(..DATE_PATTERN_LEN - 1).unwrap_or("")];

    forms.iter().find_map(|form| {
        if form.len() < DATE_PATTERN_LEN - 1
            || !form.starts_with(['1', '2'])
            || form.as_bytes()[4] != b'-'
            || form.as_bytes()[7] != b'-'
        {
            return None;
        }
        NaiveDate::parse_from_str(form, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Extension tests ===

    #[test]
    fn recognizes_mp3_extension() {
        assert_eq!(get_audio_extension("episode.mp3"), Some("mp3".to_string()));
    }

    #[test]
    fn normalizes_extension_to_lowercase() {
        assert_eq!(get_audio_extension("EPISODE.MP3"), Some("mp3".to_string()));
        assert_eq!(get_audio_extension("show.Opus"), Some("opus".to_string()));
    }

    #[test]
    fn rejects_non_audio_files() {
        assert!(!is_audio_file("cover.png"));
        assert!(!is_audio_file("notes.txt"));
        assert!(!is_audio_file("feed.rss"));
        assert!(!is_audio_file("no_extension"));
    }

    #[test]
    fn rejects_partial_uploads() {
        assert!(!is_audio_file("episode.mp3.partial"));
    }

    // === Content type tests ===

    #[test]
    fn content_type_maps_known_extensions() {
        assert_eq!(content_type_for("a.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("a.m4a"), "audio/mp4");
        assert_eq!(content_type_for("a.ogg"), "audio/ogg");
        assert_eq!(content_type_for("a.FLAC"), "audio/flac");
    }

    #[test]
    fn content_type_defaults_to_mpeg() {
        assert_eq!(content_type_for("a.bin"), "audio/mpeg");
    }

    // === Publish date tests ===

    #[test]
    fn parses_date_from_filename() {
        let date = parse_publish_date("show-2021-03-15-interview.mp3").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2021-03-15");
    }

    #[test]
    fn parses_date_at_start_of_filename() {
        let date = parse_publish_date("2020-12-31.mp3").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2020-12-31");
    }

    #[test]
    fn parses_single_digit_day() {
        let date = parse_publish_date("ep-2021-03-7.mp3").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2021-03-07");
    }

    #[test]
    fn rejects_single_digit_month() {
        assert!(parse_publish_date("ep-2021-3-07.mp3").is_none());
        assert!(parse_publish_date("2021-3-7.mp3").is_none());
    }

    #[test]
    fn uses_first_date_in_filename() {
        let date = parse_publish_date("2019-01-02-rerun-of-2018-05-06.mp3").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2019-01-02");
    }

    #[test]
    fn ignores_invalid_dates() {
        assert!(parse_publish_date("ep-2021-13-45.mp3").is_none());
        assert!(parse_publish_date("ep-3021-01-01.mp3").is_none());
    }

    #[test]
    fn returns_none_without_date() {
        assert!(parse_publish_date("episode-42.mp3").is_none());
    }
}
