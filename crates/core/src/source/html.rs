//! HTML helpers shared by the scraping sources.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};

/// Inline styles that hide an element.
static HIDDEN_INLINE_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)display:\s*none|visibility:\s*hidden|(width|height):\s*[01](px)?\s*(;|$)")
        .expect("static regex")
});

/// CSS rules in `<style>` blocks that hide whatever they select.
static HIDDEN_CSS_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)([.#]?[a-zA-Z0-9_-]+)\s*\{[^}]*?(width:\s*0|height:\s*[01](px)?|display:\s*none)[^}]*?\}",
    )
    .expect("static regex")
});

static STYLE: Lazy<Selector> = Lazy::new(|| Selector::parse("style").expect("static selector"));

/// Parse a selector known at compile time.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid static selector: {}", css))
}

/// Resolve `href` against the site root `base`.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else if href.is_empty() {
        String::new()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All text below `el`, whitespace-collapsed.
pub(crate) fn element_text(el: ElementRef) -> String {
    clean_text(&el.text().collect::<String>())
}

/// Text of the first element matching `sel`, if any and non-empty.
pub(crate) fn first_text(root: ElementRef, sel: &Selector) -> Option<String> {
    root.select(sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Attribute of the first element matching `sel`, if non-empty.
pub(crate) fn first_attr(root: ElementRef, sel: &Selector, attr: &str) -> Option<String> {
    root.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Plain text of an HTML fragment such as a chapter title.
pub(crate) fn fragment_text(fragment: &str) -> String {
    element_text(Html::parse_fragment(fragment).root_element())
}

/// Parse the leading number out of text like "1,234 Chapters".
pub(crate) fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Build a selector for everything the page's stylesheets hide.
pub(crate) fn hidden_rule_selector(doc: &Html) -> Option<Selector> {
    let mut selectors: Vec<String> = Vec::new();
    for style in doc.select(&STYLE) {
        let css = style.text().collect::<String>();
        for caps in HIDDEN_CSS_RULE.captures_iter(&css) {
            if let Some(m) = caps.get(1) {
                let sel = m.as_str().to_string();
                if !selectors.contains(&sel) {
                    selectors.push(sel);
                }
            }
        }
    }

    if selectors.is_empty() {
        return None;
    }
    Selector::parse(&selectors.join(", ")).ok()
}

/// Whether an element should be dropped from extracted text.
pub(crate) fn is_hidden(el: &ElementRef, hidden_rules: Option<&Selector>) -> bool {
    let element = el.value();
    if matches!(element.name(), "script" | "style" | "noscript") {
        return true;
    }
    if element
        .attr("style")
        .is_some_and(|style| HIDDEN_INLINE_STYLE.is_match(style))
    {
        return true;
    }
    if ["width", "height"]
        .iter()
        .any(|a| matches!(element.attr(a).map(str::trim), Some("0") | Some("1")))
    {
        return true;
    }
    hidden_rules.is_some_and(|sel| sel.matches(el))
}

/// Visible text below `el`, skipping hidden descendants.
pub(crate) fn visible_text(el: ElementRef, hidden_rules: Option<&Selector>) -> String {
    let mut out = String::new();
    collect_visible(el, hidden_rules, &mut out);
    clean_text(&out)
}

fn collect_visible(el: ElementRef, hidden_rules: Option<&Selector>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if is_hidden(&child_el, hidden_rules) {
                continue;
            }
            collect_visible(child_el, hidden_rules, out);
            if is_block(child_el.value().name()) {
                out.push(' ');
            }
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div" | "br" | "li" | "tr" | "td" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

/// Visible `<p>` paragraphs below `el`, one per line.
///
/// Falls back to the visible text of `el` when it has no paragraphs.
pub(crate) fn visible_paragraphs(el: ElementRef, hidden_rules: Option<&Selector>) -> String {
    let mut paragraphs = Vec::new();
    collect_paragraphs(el, hidden_rules, &mut paragraphs);
    if paragraphs.is_empty() {
        return visible_text(el, hidden_rules);
    }
    paragraphs.join("\n")
}

fn collect_paragraphs(el: ElementRef, hidden_rules: Option<&Selector>, out: &mut Vec<String>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        if is_hidden(&child, hidden_rules) {
            continue;
        }
        if child.value().name() == "p" {
            let text = visible_text(child, hidden_rules);
            if !text.is_empty() {
                out.push(text);
            }
        } else {
            collect_paragraphs(child, hidden_rules, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolutize() {
        let base = "https://novelfire.net";
        assert_eq!(absolutize(base, "/book/a"), "https://novelfire.net/book/a");
        assert_eq!(absolutize(base, "book/a"), "https://novelfire.net/book/a");
        assert_eq!(absolutize(base, "//cdn.x/a.jpg"), "https://cdn.x/a.jpg");
        assert_eq!(absolutize(base, "https://other/a"), "https://other/a");
        assert_eq!(absolutize(base, ""), "");
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234 Chapters"), Some(1234));
        assert_eq!(parse_count("Chapters"), None);
    }

    #[test]
    fn test_fragment_text_strips_markup() {
        assert_eq!(fragment_text("<b>Chapter 1</b>  The   Start"), "Chapter 1 The Start");
    }

    #[test]
    fn test_visible_paragraphs_skip_hidden_content() {
        let html = r#"
            <html><head><style>.sneaky { display: none; } .ok { color: red; }</style></head>
            <body><div id="content">
                <p>First line.</p>
                <p class="sneaky">Stolen from somewhere</p>
                <p style="display:none">Hidden inline</p>
                <p><span width="1">x</span>Second <i>line</i>.</p>
                <p class="ok">Third line.</p>
                <script>var a = 1;</script>
            </div></body></html>
        "#;
        let doc = Html::parse_document(html);
        let rules = hidden_rule_selector(&doc);
        assert!(rules.is_some());

        let content = doc.select(&selector("#content")).next().unwrap();
        let text = visible_paragraphs(content, rules.as_ref());
        assert_eq!(text, "First line.\nSecond line.\nThird line.");
    }

    #[test]
    fn test_visible_paragraphs_falls_back_to_text() {
        let doc = Html::parse_document("<div id='c'>Just text<br>more</div>");
        let el = doc.select(&selector("#c")).next().unwrap();
        assert_eq!(visible_paragraphs(el, None), "Just text more");
    }

    #[test]
    fn test_inline_size_rules() {
        assert!(HIDDEN_INLINE_STYLE.is_match("width: 0px;"));
        assert!(HIDDEN_INLINE_STYLE.is_match("height:1px"));
        assert!(!HIDDEN_INLINE_STYLE.is_match("height: 10px;"));
        assert!(!HIDDEN_INLINE_STYLE.is_match("width: 1.5em;"));
    }
}
