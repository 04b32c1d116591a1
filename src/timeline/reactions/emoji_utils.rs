const SKIN_TONE_AND_VARIATION: [char; 6] = [
    '\u{1F3FB}',
    '\u{1F3FC}',
    '\u{1F3FD}',
    '\u{1F3FE}',
    '\u{1F3FF}',
    '\u{FE0F}',
];

/// Grouping key for reaction content.
///
/// Without normalization the content is the key, byte for byte. With it, the NIP-25
/// like/dislike shorthands `+` and `-` (and an empty reaction) map to 👍 and 👎, and
/// skin tones are folded. Custom `:shortcode:` reactions are always kept.
pub fn normalize_reaction(content: &str, normalize_emoji: bool) -> String {
    if !normalize_emoji {
        return content.to_string();
    }

    match content.trim() {
        "+" | "" => "👍".to_string(),
        "-" => "👎".to_string(),
        other => normalize_emoji_string(other),
    }
}

/// Removes skin tone modifiers and variation selectors
pub fn normalize_emoji_string(emoji: &str) -> String {
    if !emoji.contains(SKIN_TONE_AND_VARIATION) {
        return emoji.to_string();
    }

    emoji
        .chars()
        .filter(|c| !SKIN_TONE_AND_VARIATION.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_minus() {
        assert_eq!(normalize_reaction("+", true), "👍");
        assert_eq!(normalize_reaction("-", true), "👎");
        assert_eq!(normalize_reaction("", true), "👍");
    }

    #[test]
    fn test_content_is_kept_verbatim_without_normalization() {
        assert_eq!(normalize_reaction("+", false), "+");
        assert_eq!(normalize_reaction("-", false), "-");
        assert_eq!(normalize_reaction("", false), "");
        assert_eq!(normalize_reaction("❤️", false), "❤️");
    }

    #[test]
    fn test_normalize_emoji() {
        assert_eq!(normalize_emoji_string("👋🏽"), "👋");
        assert_eq!(normalize_emoji_string("👍🏿"), "👍");
        assert_eq!(normalize_emoji_string("😀"), "😀");
        assert_eq!(normalize_emoji_string("❤️"), "❤");
    }

    #[test]
    fn test_normalization_can_be_disabled() {
        assert_eq!(normalize_reaction("👍🏿", false), "👍🏿");
        assert_eq!(normalize_reaction("👍🏿", true), "👍");
    }

    #[test]
    fn test_custom_reactions_are_kept() {
        assert_eq!(normalize_reaction(":pepe:", true), ":pepe:");
        assert_eq!(normalize_reaction("lol", true), "lol");
    }
}
