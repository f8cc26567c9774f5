//! HTML to plain text conversion for search and display.

use scraper::{Html, Node};

/// Converts post HTML into plain text.
pub trait HtmlToText: Send + Sync {
    fn html_to_plain(&self, html: &str) -> String;
}

/// Converter backed by the `scraper` HTML parser.
///
/// Block-level elements and `<br>` become line breaks; runs of spaces inside
/// a line are collapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScraperText;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "pre", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6",
    "tr", "table", "hr",
];

impl HtmlToText for ScraperText {
    fn html_to_plain(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }

        let fragment = Html::parse_fragment(html);
        let mut raw = String::new();

        for node in fragment.root_element().descendants() {
            match node.value() {
                Node::Text(text) => raw.push_str(text),
                Node::Element(element) if BLOCK_TAGS.contains(&element.name()) => {
                    raw.push('\n');
                }
                _ => {}
            }
        }

        normalize_lines(&raw)
    }
}

/// Collapse whitespace within lines and drop empty lines.
fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(ScraperText.html_to_plain("just words"), "just words");
    }

    #[test]
    fn test_paragraphs_become_lines() {
        let html = "<p>First   paragraph</p><p>Second <b>bold</b> one</p>";
        assert_eq!(
            ScraperText.html_to_plain(html),
            "First paragraph\nSecond bold one"
        );
    }

    #[test]
    fn test_entities_are_decoded() {
        assert_eq!(ScraperText.html_to_plain("a &amp; b &lt;c&gt;"), "a & b <c>");
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(ScraperText.html_to_plain(""), "");
        assert_eq!(ScraperText.html_to_plain("<p>  </p>"), "");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(ScraperText.html_to_plain("one<br>two"), "one\ntwo");
    }
}
