//! Content sanitizing: strip page chrome and locate the main content region

use crate::dom::{Element, Matcher, Node};
use tracing::debug;

/// Elements removed wherever they appear
const REMOVED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg", "canvas",
    "nav", "header", "footer", "aside",
];

/// Controls dropped outright when they carry an event handler
const HANDLER_CONTROL_TAGS: &[&str] = &["button", "input", "select", "textarea", "img", "area"];

/// Site chrome identified by class or role
const REMOVED_MATCHERS: &[Matcher] = &[
    Matcher::Class("navigation"),
    Matcher::Class("sidebar"),
    Matcher::Class("breadcrumb"),
    Matcher::Class("footer"),
    Matcher::Class("header"),
    Matcher::Class("advertisement"),
    Matcher::Class("social-links"),
    Matcher::Class("page-navigation"),
    Matcher::Class("toc-container"),
    Matcher::Role("navigation"),
];

/// Main content landmarks, highest priority first
const CONTENT_MATCHERS: &[Matcher] = &[
    Matcher::Tag("main"),
    Matcher::Role("main"),
    Matcher::Class("content"),
    Matcher::Class("documentation-content"),
    Matcher::Class("api-content"),
    Matcher::Class("tutorial-content"),
    Matcher::Tag("article"),
    Matcher::Class("main-content"),
    Matcher::Class("phaser-content"),
    Matcher::Class("docs-content"),
    Matcher::Class("guide-content"),
    Matcher::Id("content"),
];

/// Children that count towards a block's text score
const TEXT_BEARING_TAGS: &[&str] = &[
    "p", "pre", "ul", "ol", "dl", "table", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Minimum text score for the largest-block heuristic
const MIN_BLOCK_SCORE: usize = 25;

/// Removes unsafe elements and chrome, and finds the main content region
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSanitizer;

impl ContentSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Strip unsafe elements, then narrow to the main content region
    pub fn sanitize(&self, document: &Node) -> Node {
        let stripped = self.strip_unsafe(document);
        self.extract_main_content(&stripped)
    }

    /// Copy of `node` without scripts, styles, landmarks, handlers or trackers
    ///
    /// Text of retained elements is untouched.
    pub fn strip_unsafe(&self, node: &Node) -> Node {
        match node {
            Node::Text(text) => Node::Text(text.clone()),
            Node::Element(el) if should_remove(el) => Node::empty(),
            Node::Element(el) => Node::Element(strip_element(el)),
        }
    }

    /// Locate the primary content region
    ///
    /// Tries content landmarks first, then the block with the most text in
    /// direct paragraph-like children, then `body`, then the whole tree.
    pub fn extract_main_content(&self, document: &Node) -> Node {
        let root = match document {
            Node::Element(el) => el,
            Node::Text(text) if text.trim().is_empty() => return Node::empty(),
            Node::Text(text) => return Node::Text(text.clone()),
        };

        for matcher in CONTENT_MATCHERS {
            if let Some(found) = root.find(|el| matcher.matches(el) && !is_blank(el)) {
                debug!(matcher = ?matcher, "Main content found by landmark");
                return Node::Element(found.clone());
            }
        }

        if let Some(block) = largest_text_block(root) {
            debug!(tag = %block.tag, "Main content found by text density");
            return Node::Element(block.clone());
        }

        if let Some(body) = root.select_first(Matcher::Tag("body")) {
            return Node::Element(body.clone());
        }

        Node::Element(root.clone())
    }
}

fn should_remove(el: &Element) -> bool {
    REMOVED_TAGS.contains(&el.tag.as_str())
        || REMOVED_MATCHERS.iter().any(|m| m.matches(el))
        || (HANDLER_CONTROL_TAGS.contains(&el.tag.as_str()) && has_event_handler(el))
        || is_tracking_pixel(el)
}

fn strip_element(el: &Element) -> Element {
    let mut out = Element::new(el.tag.clone());
    out.attrs = el
        .attrs
        .iter()
        .filter(|(name, value)| !is_event_handler(name) && !(name == "href" && is_script_url(value)))
        .cloned()
        .collect();
    out.children = el
        .children
        .iter()
        .filter(|child| !matches!(child, Node::Element(e) if should_remove(e)))
        .map(|child| match child {
            Node::Text(text) => Node::Text(text.clone()),
            Node::Element(e) => Node::Element(strip_element(e)),
        })
        .collect();
    out
}

fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

fn has_event_handler(el: &Element) -> bool {
    el.attrs.iter().any(|(name, _)| is_event_handler(name))
}

fn is_script_url(value: &str) -> bool {
    let value: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    value.to_ascii_lowercase().starts_with("javascript:")
}

/// 1x1 (or smaller) images; best effort
fn is_tracking_pixel(el: &Element) -> bool {
    if el.tag != "img" {
        return false;
    }
    let tiny = |name: &str| {
        el.attr(name)
            .map(|v| v.trim().trim_end_matches("px").trim())
            .and_then(|v| v.parse::<f64>().ok())
            .is_some_and(|v| v <= 1.0)
    };
    tiny("width") && tiny("height")
}

fn is_blank(el: &Element) -> bool {
    el.text_content().trim().is_empty()
}

fn block_score(el: &Element) -> usize {
    el.children
        .iter()
        .map(|child| match child {
            Node::Text(text) => text.trim().chars().count(),
            Node::Element(c) if TEXT_BEARING_TAGS.contains(&c.tag.as_str()) => {
                c.text_content().trim().chars().count()
            }
            Node::Element(_) => 0,
        })
        .sum()
}

fn largest_text_block(root: &Element) -> Option<&Element> {
    let mut best: Option<(&Element, usize)> = None;
    root.walk(&mut |el| {
        if !matches!(el.tag.as_str(), "div" | "section") {
            return;
        }
        let score = block_score(el);
        if score >= MIN_BLOCK_SCORE && best.map_or(true, |(_, s)| score > s) {
            best = Some((el, score));
        }
    });
    best.map(|(el, _)| el)
}
