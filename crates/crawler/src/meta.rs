use scraper::{Html, Selector};
use tracing::debug;

use crate::CrawlerError;

/// Meta tag carrying the direct media URL of a recording page.
pub const STREAM_META_NAME: &str = "twitter:player:stream";

/// Returns the first non-empty `content` of a `<meta name="...">` tag.
pub fn extract_meta_content(html: &str, name: &str) -> Result<Option<String>, CrawlerError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("meta[name]").map_err(|e| CrawlerError::ParseError(e.to_string()))?;

    let content = document
        .select(&selector)
        .filter(|element| element.value().attr("name") == Some(name))
        .filter_map(|element| element.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string);

    debug!("meta {} present: {}", name, content.is_some());
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_stream_url() {
        let html = r#"
            <html>
                <head>
                    <meta name="twitter:card" content="player">
                    <meta name="twitter:player:stream" content="https://cdn/x.mp3">
                </head>
                <body></body>
            </html>
        "#;

        let content = extract_meta_content(html, STREAM_META_NAME).unwrap();
        assert_eq!(content.as_deref(), Some("https://cdn/x.mp3"));
    }

    #[test]
    fn test_missing_tag() {
        let html = r#"<html><head><meta property="og:title" content="x"></head></html>"#;
        assert_eq!(extract_meta_content(html, STREAM_META_NAME).unwrap(), None);
    }

    #[test]
    fn test_empty_content_is_ignored() {
        let html = r#"<meta name="twitter:player:stream" content="  ">"#;
        assert_eq!(extract_meta_content(html, STREAM_META_NAME).unwrap(), None);
    }

    #[test]
    fn test_entities_are_decoded() {
        let html = r#"<meta name="twitter:player:stream" content="https://cdn/x.m4a?a=1&amp;b=2">"#;
        assert_eq!(
            extract_meta_content(html, STREAM_META_NAME).unwrap().as_deref(),
            Some("https://cdn/x.m4a?a=1&b=2")
        );
    }
}
