//! Read-side companion to the rewriter: lists the resolved image URLs a saved
//! chat refers to.

use crate::models::ChatMessage;

const URL_OPEN: &str = "(https://";

/// Distinct `(https://...png)` references across all messages, in order of
/// first appearance.
pub fn collect_image_urls(messages: &[ChatMessage]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for content in messages.iter().filter_map(ChatMessage::text_content) {
        for url in image_urls_in(content) {
            if !urls.iter().any(|existing| existing == url) {
                urls.push(url.to_string());
            }
        }
    }
    urls
}

/// Every `(https://...png)` reference in one body, duplicates included.
pub fn image_urls_in(content: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find(URL_OPEN) {
        // skip the opening paren, keep the scheme
        let candidate = &rest[start + 1..];
        let Some(end) = candidate.find(')') else {
            break;
        };
        let url = &candidate[..end];
        // a later opener before the close paren starts the real reference
        if let Some(inner) = url.find(URL_OPEN) {
            rest = &candidate[inner..];
            continue;
        }
        if url.ends_with(".png") {
            found.push(url);
        }
        rest = &candidate[end + 1..];
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> ChatMessage {
        ChatMessage::text("assistant", content)
    }

    #[test]
    fn test_no_urls() {
        let messages = vec![message("nothing here"), ChatMessage::default()];
        assert!(collect_image_urls(&messages).is_empty());
    }

    #[test]
    fn test_distinct_in_first_appearance_order() {
        let messages = vec![
            message("(https://x.test/b.png) then (https://x.test/a.png)"),
            message("again (https://x.test/b.png) and (https://x.test/c.png)"),
        ];
        assert_eq!(
            collect_image_urls(&messages),
            vec![
                "https://x.test/b.png".to_string(),
                "https://x.test/a.png".to_string(),
                "https://x.test/c.png".to_string(),
            ]
        );
    }

    #[test]
    fn test_ignores_placeholders_and_other_links() {
        let content = "(image://a.png) (https://x.test/page.html) (http://x.test/old.png) (https://x.test/ok.png)";
        assert_eq!(image_urls_in(content), vec!["https://x.test/ok.png"]);
    }

    #[test]
    fn test_unterminated_url_is_skipped() {
        assert_eq!(
            image_urls_in("(https://x.test/a.png) (https://x.test/b.png"),
            vec!["https://x.test/a.png"]
        );
    }

    #[test]
    fn test_unclosed_link_before_url() {
        assert_eq!(
            image_urls_in("(https://a.test/x and (https://b.test/c.png)"),
            vec!["https://b.test/c.png"]
        );
    }
}
