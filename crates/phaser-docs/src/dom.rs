//! Owned HTML tree
//!
//! Pages are parsed once with `scraper` (lenient html5ever parsing) and
//! copied into a small tagged tree of [`Node`]s. Sanitizing, conversion and
//! API extraction all pattern-match over this tree instead of the parser's
//! node types, and it can be built or rewritten freely in tests.

use scraper::{ElementRef, Html};

/// Nesting depth past which elements are flattened to their text
pub const MAX_DEPTH: usize = 512;

/// A node of the parsed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An HTML element with lowercase tag name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Simple element matcher, the subset of CSS selectors the pipeline needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// `tag`
    Tag(&'static str),
    /// `.class`
    Class(&'static str),
    /// `#id`
    Id(&'static str),
    /// `[role=value]`
    Role(&'static str),
}

impl Matcher {
    pub fn matches(&self, element: &Element) -> bool {
        match *self {
            Matcher::Tag(tag) => element.tag == tag,
            Matcher::Class(class) => element.has_class(class),
            Matcher::Id(id) => element.attr("id") == Some(id),
            Matcher::Role(role) => element
                .attr("role")
                .is_some_and(|r| r.eq_ignore_ascii_case(role)),
        }
    }
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// 1-6 for `h1`-`h6`
    pub fn heading_level(&self) -> Option<usize> {
        match self.tag.as_str() {
            "h1" => Some(1),
            "h2" => Some(2),
            "h3" => Some(3),
            "h4" => Some(4),
            "h5" => Some(5),
            "h6" => Some(6),
            _ => None,
        }
    }

    /// Concatenated text of all descendants, unnormalized
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Child elements, skipping text
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First descendant (or self) matching `pred`, in document order
    pub fn find<P>(&self, pred: P) -> Option<&Element>
    where
        P: Fn(&Element) -> bool + Copy,
    {
        if pred(self) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find(pred))
    }

    /// First descendant (or self) matched by `matcher`
    pub fn select_first(&self, matcher: Matcher) -> Option<&Element> {
        self.find(|el| matcher.matches(el))
    }

    /// Visit self and every descendant element in document order
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Element),
    {
        f(self);
        for child in self.child_elements() {
            child.walk(f);
        }
    }
}

impl Node {
    /// An element with no content, returned when nothing usable was parsed
    pub fn empty() -> Self {
        Node::Element(Element::new("div"))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Element(el) => el.text_content(),
            Node::Text(text) => text.clone(),
        }
    }

    /// True if the node holds no non-whitespace text
    pub fn is_blank(&self) -> bool {
        match self {
            Node::Text(text) => text.trim().is_empty(),
            Node::Element(el) => el.children.iter().all(Node::is_blank),
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Parse an HTML document; never fails, malformed markup is recovered
pub fn parse_document(html: &str) -> Node {
    if html.trim().is_empty() {
        return Node::empty();
    }
    let document = Html::parse_document(html);
    Node::Element(convert_element(document.root_element(), 0))
}

fn convert_element(element: ElementRef<'_>, depth: usize) -> Element {
    let value = element.value();
    let mut out = Element::new(value.name().to_ascii_lowercase());
    out.attrs = value
        .attrs()
        .map(|(name, val)| (name.to_ascii_lowercase(), val.to_string()))
        .collect();

    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => push_text(&mut out.children, text),
            scraper::Node::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    if depth >= MAX_DEPTH {
                        let text: String = child_ref.text().collect();
                        push_text(&mut out.children, &text);
                    } else {
                        out.children
                            .push(Node::Element(convert_element(child_ref, depth + 1)));
                    }
                }
            }
            _ => {}
        }
    }

    out
}

fn push_text(children: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    // html5ever may split text runs; keep them merged
    if let Some(Node::Text(last)) = children.last_mut() {
        last.push_str(text);
    } else {
        children.push(Node::Text(text.to_string()));
    }
}

/// Collapse every whitespace run to one space and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
