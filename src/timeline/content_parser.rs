//! Extracts structured sub-content from chat event payloads.
//!
//! Used for the primary event and, separately, for a resolved reply parent so the
//! inline reply preview can show a thumbnail.

use nostr_sdk::parser::{NostrParser, Token};
use serde::{Deserialize, Serialize};

const IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".avif", ".svg", ".bmp",
];

/// Serializable Token
/// This is a parallel of the `Token` enum from the `nostr` crate, owned so display
/// records can carry it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SerializableToken {
    /// Nostr URI converted to a string
    Nostr(String),
    /// Url converted to a string
    Url(String),
    /// Hashtag
    Hashtag(String),
    /// Other text
    Text(String),
    /// Line break
    LineBreak,
    /// A whitespace
    Whitespace,
}

impl<'a> From<Token<'a>> for SerializableToken {
    fn from(value: Token<'a>) -> Self {
        match value {
            Token::Nostr(n) => SerializableToken::Nostr(match n.to_nostr_uri() {
                Ok(uri) => uri,
                Err(e) => format!("invalid_nostr_uri:{}", e),
            }),
            Token::Url(u) => SerializableToken::Url(u.to_string()),
            Token::Hashtag(h) => SerializableToken::Hashtag(h.to_string()),
            Token::Text(t) => SerializableToken::Text(t.to_string()),
            Token::LineBreak => SerializableToken::LineBreak,
            Token::Whitespace => SerializableToken::Whitespace,
        }
    }
}

/// Side-effect-free content extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentParser;

impl ContentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn tokens(&self, content: &str) -> Vec<SerializableToken> {
        let parser = NostrParser::new();
        parser.parse(content).map(SerializableToken::from).collect()
    }

    /// First URL in `content` that points at an image.
    pub fn extract_first_image(&self, content: &str) -> Option<String> {
        self.tokens(content).into_iter().find_map(|token| match token {
            SerializableToken::Url(url) if is_image_url(&url) => Some(url),
            _ => None,
        })
    }

    /// Readable text with image links removed and whitespace collapsed per line.
    pub fn extract_plain_text(&self, content: &str) -> String {
        let mut text = String::with_capacity(content.len());
        for token in self.tokens(content) {
            match token {
                SerializableToken::Text(t) => text.push_str(&t),
                SerializableToken::Hashtag(h) => {
                    text.push('#');
                    text.push_str(&h);
                }
                SerializableToken::Nostr(uri) => text.push_str(&uri),
                SerializableToken::Url(url) if !is_image_url(&url) => text.push_str(&url),
                SerializableToken::Url(_) => {}
                SerializableToken::LineBreak => text.push('\n'),
                SerializableToken::Whitespace => text.push(' '),
            }
        }

        let lines: Vec<String> = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        lines.join("\n").trim().to_string()
    }
}

pub fn is_image_url(url: &str) -> bool {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_is_found() {
        let parser = ContentParser::new();
        let content = "look https://example.com/page and https://cdn.example.com/cat.PNG?w=200 \
                       then https://cdn.example.com/dog.jpg";
        assert_eq!(
            parser.extract_first_image(content).as_deref(),
            Some("https://cdn.example.com/cat.PNG?w=200")
        );
    }

    #[test]
    fn test_no_image() {
        let parser = ContentParser::new();
        assert!(parser.extract_first_image("just words").is_none());
        assert!(parser
            .extract_first_image("https://example.com/article.html")
            .is_none());
        assert!(parser.extract_first_image("").is_none());
    }

    #[test]
    fn test_plain_text_drops_images() {
        let parser = ContentParser::new();
        let content = "hello https://cdn.example.com/cat.gif world";
        assert_eq!(parser.extract_plain_text(content), "hello world");
    }

    #[test]
    fn test_plain_text_keeps_links_and_hashtags() {
        let parser = ContentParser::new();
        let text = parser.extract_plain_text("read https://example.com/post #rust");
        assert!(text.contains("https://example.com/post"));
        assert!(text.contains("#rust"));
    }

    #[test]
    fn test_plain_text_keeps_line_breaks() {
        let parser = ContentParser::new();
        assert_eq!(
            parser.extract_plain_text("  first line\nsecond   line  "),
            "first line\nsecond line"
        );
    }

    #[test]
    fn test_is_image_url() {
        assert!(is_image_url("https://x.com/a.webp"));
        assert!(is_image_url("https://x.com/a.jpeg#frag"));
        assert!(!is_image_url("https://x.com/a.png.html"));
    }
}
