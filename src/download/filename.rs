use crate::item::PlayableItem;

/// Maximum length for the title portion of a filename
const MAX_TITLE_LENGTH: usize = 100;

/// Extension used when neither the URL nor the MIME type names one
const DEFAULT_EXTENSION: &str = "mp3";

/// Check if a character is allowed in filenames (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

/// Derive the stable filename stem for an item
///
/// Format: "YYYY-MM-DD-sanitized-title" or "undated-sanitized-title". Titles
/// that sanitize to nothing fall back to the item's GUID.
pub fn generate_filename_stem(item: &PlayableItem) -> String {
    let date_prefix = item
        .pub_date()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    let mut name = sanitize_title(item.title());
    if name.is_empty() {
        name = sanitize_guid(item.guid());
    }

    format!("{}-{}", date_prefix, name)
}

/// Get the audio file extension for an item's audio attachment
///
/// Taken from the URL path, then the MIME type, defaulting to "mp3"
pub fn get_audio_extension(item: &PlayableItem) -> String {
    let Some(audio) = item.audio() else {
        return DEFAULT_EXTENSION.to_string();
    };

    if let Some(ext) = audio
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|filename| filename.contains('.'))
        .and_then(|filename| filename.rsplit('.').next())
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(ref mime) = audio.mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    DEFAULT_EXTENSION.to_string()
}

/// Generate the complete filename for an item's download
pub fn generate_filename(item: &PlayableItem) -> String {
    format!(
        "{}.{}",
        generate_filename_stem(item),
        get_audio_extension(item)
    )
}

/// Filename for an item whose regular name is taken by a different item
///
/// The sanitized GUID is appended to the stem; `attempt` values above 1 add a
/// counter on top.
pub fn generate_disambiguated_filename(item: &PlayableItem, attempt: usize) -> String {
    let suffix = match attempt {
        0 | 1 => sanitize_guid(item.guid()),
        n => format!("{}-{}", sanitize_guid(item.guid()), n),
    };

    format!(
        "{}-{}.{}",
        generate_filename_stem(item),
        suffix,
        get_audio_extension(item)
    )
}

fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| if is_valid_filename_char(c) { c } else { '-' })
        .collect();

    let collapsed = collapse_separators(&sanitized);
    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c.is_whitespace());

    truncate_at_boundary(trimmed, MAX_TITLE_LENGTH)
}

/// GUIDs are frequently URLs, so run them through the platform-aware sanitizer
fn sanitize_guid(guid: &str) -> String {
    let options = sanitize_filename::Options {
        windows: true,
        truncate: true,
        replacement: "-",
    };
    let sanitized = sanitize_filename::sanitize_with_options(guid, options);
    let collapsed = collapse_separators(&sanitized);
    let trimmed = collapsed.trim_matches('-');

    if trimmed.is_empty() {
        "episode".to_string()
    } else {
        truncate_at_boundary(trimmed, MAX_TITLE_LENGTH)
    }
}

/// Collapse runs of spaces and dashes into a single dash
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if c == '-' || c.is_whitespace() {
            if !last_was_separator {
                result.push('-');
                last_was_separator = true;
            }
        } else {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }

    let truncated: String = s.chars().take(max_len).collect();
    if let Some(pos) = truncated.rfind('-')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('-').to_string()
}

fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{MediaContent, MediaKind};
    use chrono::DateTime;
    use url::Url;

    fn make_item(title: &str, date: Option<&str>, url: &str) -> PlayableItem {
        make_item_with_mime(title, date, url, None)
    }

    fn make_item_with_mime(
        title: &str,
        date: Option<&str>,
        url: &str,
        mime: Option<&str>,
    ) -> PlayableItem {
        let mut item = PlayableItem::new("test-guid", title).with_media(MediaContent {
            kind: MediaKind::Audio,
            url: Url::parse(url).unwrap(),
            mime_type: mime.map(String::from),
        });
        if let Some(date) = date {
            item = item.with_pub_date(DateTime::parse_from_rfc2822(date).unwrap());
        }
        item
    }

    #[test]
    fn disambiguated_name_appends_guid() {
        let item = make_item("Trailer", None, "https://example.com/feed/a.mp3");

        assert_eq!(generate_filename(&item), "undated-Trailer.mp3");
        assert_eq!(
            generate_disambiguated_filename(&item, 1),
            "undated-Trailer-test-guid.mp3"
        );
        assert_eq!(
            generate_disambiguated_filename(&item, 3),
            "undated-Trailer-test-guid-3.mp3"
        );
    }

    #[test]
    fn sanitize_replaces_special_chars_with_dash() {
        assert_eq!(sanitize_title("a:b/c\\d"), "a-b-c-d");
    }

    #[test]
    fn sanitize_drops_unicode_and_emoji() {
        assert_eq!(sanitize_title("Hello 🎙️ World"), "Hello-World");
        assert_eq!(sanitize_title("Café résumé"), "Caf-r-sum");
    }

    #[test]
    fn sanitize_trims_leading_trailing_separators() {
        assert_eq!(sanitize_title("  --hello--  "), "hello");
    }

    #[test]
    fn sanitize_handles_only_invalid_chars() {
        assert_eq!(sanitize_title(":::///"), "");
    }

    #[test]
    fn collapse_mixed_separators() {
        assert_eq!(collapse_separators("hello - - world"), "hello-world");
    }

    #[test]
    fn truncate_cuts_at_word_boundary() {
        let result = truncate_at_boundary("word1-word2-word3-word4-word5", 20);
        assert!(result.len() <= 20);
        assert!(!result.ends_with('-'));
    }

    #[test]
    fn truncate_handles_no_boundaries() {
        let long = "a".repeat(150);
        assert_eq!(truncate_at_boundary(&long, 100).len(), 100);
    }

    #[test]
    fn filename_stem_includes_date_prefix() {
        let item = make_item(
            "Test Episode",
            Some("Mon, 15 Jan 2024 12:00:00 +0000"),
            "https://example.com/ep.mp3",
        );

        assert_eq!(generate_filename_stem(&item), "2024-01-15-Test-Episode");
    }

    #[test]
    fn filename_stem_uses_undated_when_no_date() {
        let item = make_item("Test Episode", None, "https://example.com/ep.mp3");
        assert_eq!(generate_filename_stem(&item), "undated-Test-Episode");
    }

    #[test]
    fn filename_stem_falls_back_to_guid() {
        let item = PlayableItem::new("https://example.com/guid/42", "🎙️🎙️");
        let stem = generate_filename_stem(&item);

        assert!(stem.starts_with("undated-"));
        assert!(stem.contains("42"));
        assert!(!stem.contains('/'));
    }

    #[test]
    fn filename_is_stable_for_the_same_item() {
        let item = make_item("Stable", None, "https://example.com/ep.mp3");
        assert_eq!(generate_filename(&item), generate_filename(&item));
    }

    #[test]
    fn extracts_extension_from_url() {
        let item = make_item("Test", None, "https://example.com/episode.M4A?token=abc");
        assert_eq!(get_audio_extension(&item), "m4a");
    }

    #[test]
    fn falls_back_to_mime_type() {
        let item = make_item_with_mime(
            "Test",
            None,
            "https://example.com/episode",
            Some("audio/ogg"),
        );
        assert_eq!(get_audio_extension(&item), "ogg");
    }

    #[test]
    fn defaults_to_mp3() {
        let item = make_item("Test", None, "https://example.com/episode.html");
        assert_eq!(get_audio_extension(&item), "mp3");

        let no_audio = PlayableItem::new("guid", "No audio");
        assert_eq!(get_audio_extension(&no_audio), "mp3");
    }

    #[test]
    fn generate_filename_combines_stem_and_extension() {
        let item = make_item(
            "My Episode",
            Some("Mon, 15 Jan 2024 12:00:00 +0000"),
            "https://example.com/audio.mp3",
        );

        assert_eq!(generate_filename(&item), "2024-01-15-My-Episode.mp3");
    }
}
