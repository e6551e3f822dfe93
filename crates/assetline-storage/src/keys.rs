//! Derived-asset key generation shared by every processor.

/// Drop the last `.ext` of the final path segment. Dots in directory names and
/// leading dots (`.env`) are kept.
pub fn strip_extension(key: &str) -> &str {
    let segment_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => &key[..segment_start + dot],
        _ => key,
    }
}

/// Lowercased extension of the final path segment, if any.
pub fn extension(key: &str) -> Option<String> {
    let stem = strip_extension(key);
    if stem.len() == key.len() {
        return None;
    }
    let ext = &key[stem.len() + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// `stripExtension(source) + "__" + marker + "." + ext`
pub fn derived_key(source_key: &str, marker: &str, ext: &str) -> String {
    format!("{}__{}.{}", strip_extension(source_key), marker, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_the_final_extension() {
        assert_eq!(strip_extension("u/1.jpg"), "u/1");
        assert_eq!(strip_extension("u/archive.tar.gz"), "u/archive.tar");
        assert_eq!(strip_extension("v1.2/blob"), "v1.2/blob");
        assert_eq!(strip_extension("u/.hidden"), "u/.hidden");
        assert_eq!(strip_extension("plain"), "plain");
    }

    #[test]
    fn derived_keys_sit_next_to_the_source() {
        assert_eq!(
            derived_key("u/1.jpg", "thumbnail_512", "webp"),
            "u/1__thumbnail_512.webp"
        );
        assert_eq!(derived_key("files/blob", "safety", "json"), "files/blob__safety.json");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension("clip.MP3").as_deref(), Some("mp3"));
        assert_eq!(extension("v1.2/blob"), None);
        assert_eq!(extension("trailing."), None);
    }
}
