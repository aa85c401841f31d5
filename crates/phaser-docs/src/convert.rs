//! HTML to Markdown conversion
//!
//! Conversion is driven by [`RULES`], a table from tag name to [`Rule`].
//! Block rules flush pending inline text and emit a standalone block; inline
//! rules render to a fragment appended to the current paragraph. Tags not in
//! the table are unwrapped so their text is never lost.

use crate::dom::{collapse_whitespace, parse_document, Element, Matcher, Node};
use crate::sanitize::ContentSanitizer;
use crate::DEFAULT_TITLE;
use url::Url;

/// How an element is converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Dropped with its content (non-content elements)
    Skip,
    /// Children processed, tag dropped
    Unwrap,
    /// Paragraph-like container
    Block,
    Heading(usize),
    /// Fenced code block
    Pre,
    /// Backtick span
    Code,
    Table,
    List { ordered: bool },
    Blockquote,
    HorizontalRule,
    LineBreak,
    Link,
    Image,
    Emphasis(&'static str),
}

/// Tag to conversion rule; anything missing is [`Rule::Unwrap`]
pub const RULES: &[(&str, Rule)] = &[
    ("head", Rule::Skip),
    ("title", Rule::Skip),
    ("meta", Rule::Skip),
    ("link", Rule::Skip),
    ("script", Rule::Skip),
    ("style", Rule::Skip),
    ("noscript", Rule::Skip),
    ("template", Rule::Skip),
    ("input", Rule::Skip),
    ("select", Rule::Skip),
    ("h1", Rule::Heading(1)),
    ("h2", Rule::Heading(2)),
    ("h3", Rule::Heading(3)),
    ("h4", Rule::Heading(4)),
    ("h5", Rule::Heading(5)),
    ("h6", Rule::Heading(6)),
    ("html", Rule::Block),
    ("body", Rule::Block),
    ("p", Rule::Block),
    ("div", Rule::Block),
    ("section", Rule::Block),
    ("article", Rule::Block),
    ("main", Rule::Block),
    ("header", Rule::Block),
    ("footer", Rule::Block),
    ("nav", Rule::Block),
    ("aside", Rule::Block),
    ("figure", Rule::Block),
    ("figcaption", Rule::Block),
    ("details", Rule::Block),
    ("summary", Rule::Block),
    ("address", Rule::Block),
    ("dl", Rule::Block),
    ("dt", Rule::Block),
    ("dd", Rule::Block),
    ("li", Rule::Block),
    ("pre", Rule::Pre),
    ("code", Rule::Code),
    ("kbd", Rule::Code),
    ("samp", Rule::Code),
    ("tt", Rule::Code),
    ("table", Rule::Table),
    ("ul", Rule::List { ordered: false }),
    ("ol", Rule::List { ordered: true }),
    ("blockquote", Rule::Blockquote),
    ("hr", Rule::HorizontalRule),
    ("br", Rule::LineBreak),
    ("a", Rule::Link),
    ("img", Rule::Image),
    ("strong", Rule::Emphasis("**")),
    ("b", Rule::Emphasis("**")),
    ("em", Rule::Emphasis("*")),
    ("i", Rule::Emphasis("*")),
    ("del", Rule::Emphasis("~~")),
    ("s", Rule::Emphasis("~~")),
    ("strike", Rule::Emphasis("~~")),
];

/// Language names recognised as bare class names on code blocks
const KNOWN_LANGUAGES: &[&str] = &[
    "javascript", "js", "typescript", "ts", "json", "html", "css", "bash", "shell", "glsl",
];

/// Title selectors, highest priority first
const TITLE_MATCHERS: &[Matcher] = &[
    Matcher::Tag("h1"),
    Matcher::Class("page-title"),
    Matcher::Class("api-title"),
    Matcher::Class("class-name"),
    Matcher::Tag("title"),
];

/// Site suffixes stripped from page titles
const TITLE_SUFFIXES: &[&str] = &[
    " - Phaser 3 Documentation",
    " | Phaser Documentation",
    " :: Phaser Documentation",
    " | Phaser 3",
    " - Phaser",
];

/// Look up the rule for a lowercase tag name
pub fn rule_for(tag: &str) -> Rule {
    RULES
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, rule)| *rule)
        .unwrap_or(Rule::Unwrap)
}

/// Converts a sanitized tree to Markdown
#[derive(Debug, Clone, Default)]
pub struct MarkdownConverter {
    base: Option<Url>,
}

impl MarkdownConverter {
    /// Converter that leaves relative links untouched
    pub fn new() -> Self {
        Self { base: None }
    }

    /// Converter that resolves relative links and images against `base`
    pub fn with_base_url(base: Url) -> Self {
        Self { base: Some(base) }
    }

    /// Convert a node to Markdown; deterministic for a given tree
    pub fn convert(&self, node: &Node) -> String {
        let mut writer = BlockWriter::default();
        self.render(node, &mut writer);
        writer.finish().join("\n\n")
    }

    fn render(&self, node: &Node, w: &mut BlockWriter) {
        match node {
            Node::Text(text) => w.push_text(text),
            Node::Element(el) => self.render_element(el, w),
        }
    }

    fn render_children(&self, el: &Element, w: &mut BlockWriter) {
        for child in &el.children {
            self.render(child, w);
        }
    }

    fn render_element(&self, el: &Element, w: &mut BlockWriter) {
        match rule_for(&el.tag) {
            Rule::Skip => {}
            Rule::Unwrap => self.render_children(el, w),
            Rule::Block => {
                w.flush();
                self.render_children(el, w);
                w.flush();
            }
            Rule::Heading(level) => {
                let text = self.inline_text(&el.children);
                if !text.is_empty() {
                    w.push_block(format!("{} {}", "#".repeat(level), text));
                } else {
                    w.flush();
                }
            }
            Rule::Pre => w.push_block(render_pre(el)),
            Rule::Code => w.push_fragment(&render_code_span(el)),
            Rule::Table => w.push_block(render_table(el)),
            Rule::List { ordered } => w.push_block(self.render_list(el, ordered)),
            Rule::Blockquote => w.push_block(quote(&self.convert_children(el))),
            Rule::HorizontalRule => w.push_block("---".to_string()),
            Rule::LineBreak => w.line_break(),
            Rule::Link => w.push_fragment(&self.render_link(el)),
            Rule::Image => w.push_fragment(&self.render_image(el)),
            Rule::Emphasis(marker) => w.push_fragment(&self.render_emphasis(el, marker)),
        }
    }

    /// Children rendered and flattened to one line
    fn inline_text(&self, nodes: &[Node]) -> String {
        let mut w = BlockWriter::default();
        for node in nodes {
            self.render(node, &mut w);
        }
        w.finish()
            .iter()
            .flat_map(|block| block.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn convert_children(&self, el: &Element) -> String {
        let mut w = BlockWriter::default();
        self.render_children(el, &mut w);
        w.finish().join("\n\n")
    }

    fn absolutize(&self, href: &str) -> String {
        match &self.base {
            Some(base) => base
                .join(href)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        }
    }

    fn render_link(&self, el: &Element) -> String {
        let text = self.inline_text(&el.children);
        let href = el.attr("href").map(str::trim).filter(|h| !h.is_empty());
        match href {
            Some(href) => {
                let url = self.absolutize(href);
                let text = if text.is_empty() { url.clone() } else { text };
                format!("[{}]({})", text, url)
            }
            None => text,
        }
    }

    fn render_image(&self, el: &Element) -> String {
        let src = match el.attr("src").map(str::trim) {
            Some(src) if !src.is_empty() && !src.starts_with("data:") => src,
            _ => return String::new(),
        };
        let alt = collapse_whitespace(el.attr("alt").unwrap_or_default());
        format!("![{}]({})", alt, self.absolutize(src))
    }

    fn render_emphasis(&self, el: &Element, marker: &str) -> String {
        let raw = el.text_content();
        let lead = if raw.starts_with(char::is_whitespace) { " " } else { "" };
        let trail = if raw.ends_with(char::is_whitespace) { " " } else { "" };
        let text = self.inline_text(&el.children);
        if text.is_empty() {
            return lead.to_string();
        }
        format!("{}{}{}{}{}", lead, marker, text, marker, trail)
    }

    fn render_list(&self, list: &Element, ordered: bool) -> String {
        let mut number = if ordered {
            list.attr("start")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(1)
        } else {
            1
        };
        let mut items: Vec<String> = Vec::new();

        for child in &list.children {
            if child.is_blank() {
                continue;
            }
            // Lists nested directly in a list belong to the previous item
            if let Node::Element(nested) = child {
                if let Rule::List { ordered } = rule_for(&nested.tag) {
                    let md = self.render_list(nested, ordered);
                    match items.last_mut() {
                        Some(last) if !md.is_empty() => {
                            last.push('\n');
                            last.push_str(&indent(&md, 2));
                        }
                        _ => items.push(md),
                    }
                    continue;
                }
            }

            let mut w = BlockWriter::default();
            match child {
                Node::Element(li) if li.tag == "li" => self.render_children(li, &mut w),
                other => self.render(other, &mut w),
            }
            let body = w.finish().join("\n");

            let marker = if ordered {
                format!("{}. ", number)
            } else {
                "- ".to_string()
            };
            number += 1;
            items.push(list_item(&marker, &body));
        }

        items.retain(|item| !item.is_empty());
        items.join("\n")
    }
}

/// Accumulates Markdown blocks plus the paragraph being built
#[derive(Debug, Default)]
struct BlockWriter {
    blocks: Vec<String>,
    inline: String,
}

impl BlockWriter {
    /// Append text, collapsing whitespace runs to single spaces
    fn push_text(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() {
                if !self.inline.is_empty() && !self.inline.ends_with([' ', '\n']) {
                    self.inline.push(' ');
                }
            } else {
                self.inline.push(c);
            }
        }
    }

    /// Append an already rendered inline fragment
    fn push_fragment(&mut self, fragment: &str) {
        let trimmed = fragment.trim_start();
        if trimmed.len() != fragment.len() {
            self.push_text(" ");
        }
        self.inline.push_str(trimmed);
    }

    fn line_break(&mut self) {
        let kept = self.inline.trim_end_matches(' ').len();
        self.inline.truncate(kept);
        if !self.inline.is_empty() {
            self.inline.push('\n');
        }
    }

    fn flush(&mut self) {
        let text = self
            .inline
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        self.inline.clear();
        if !text.is_empty() {
            self.blocks.push(text);
        }
    }

    fn push_block(&mut self, block: String) {
        self.flush();
        if !block.trim().is_empty() {
            self.blocks.push(block);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.blocks
    }
}

fn render_pre(el: &Element) -> String {
    let raw = el.text_content();
    let code = raw.trim_start_matches(['\n', '\r']).trim_end();
    if code.is_empty() {
        return String::new();
    }
    let lang = code_language(el).unwrap_or_default();
    let fence = "`".repeat((longest_backtick_run(code) + 1).max(3));
    format!("{}{}\n{}\n{}", fence, lang, code, fence)
}

/// Language hint from `language-*`/`lang-*` classes, data attributes or a
/// bare language class, on the `pre` or its first `code` child
fn code_language(pre: &Element) -> Option<String> {
    let candidates = [Some(pre), pre.select_first(Matcher::Tag("code"))];
    for el in candidates.into_iter().flatten() {
        for class in el.classes() {
            if let Some(lang) = class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
            {
                if !lang.is_empty() {
                    return Some(lang.to_ascii_lowercase());
                }
            }
        }
        if let Some(lang) = el.attr("data-lang").or_else(|| el.attr("data-language")) {
            let lang = lang.trim();
            if !lang.is_empty() {
                return Some(lang.to_ascii_lowercase());
            }
        }
        if let Some(lang) = el
            .classes()
            .map(str::to_ascii_lowercase)
            .find(|c| KNOWN_LANGUAGES.contains(&c.as_str()))
        {
            return Some(lang);
        }
    }
    None
}

fn render_code_span(el: &Element) -> String {
    let text = el.text_content().replace(['\r', '\n'], " ");
    if text.trim().is_empty() {
        return String::new();
    }
    let ticks = "`".repeat(longest_backtick_run(&text) + 1);
    if text.starts_with('`') || text.ends_with('`') {
        format!("{} {} {}", ticks, text, ticks)
    } else {
        format!("{}{}{}", ticks, text, ticks)
    }
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn render_table(table: &Element) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    collect_rows(table, &mut rows);
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(table_row(&rows[0]));
    lines.push(table_row(&vec!["---".to_string(); width]));
    for row in &rows[1..] {
        lines.push(table_row(row));
    }
    lines.join("\n")
}

fn collect_rows(el: &Element, rows: &mut Vec<Vec<String>>) {
    for child in el.child_elements() {
        match child.tag.as_str() {
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            "tr" => {
                let cells: Vec<String> = child
                    .child_elements()
                    .filter(|cell| cell.tag == "th" || cell.tag == "td")
                    .map(cell_text)
                    .collect();
                if !cells.is_empty() {
                    rows.push(cells);
                }
            }
            _ => {}
        }
    }
}

/// Single-line cell text; block children are separated by spaces
fn cell_text(cell: &Element) -> String {
    let mut out = String::new();
    flat_text(&cell.children, &mut out);
    collapse_whitespace(&out).replace('|', "\\|")
}

fn flat_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let rule = rule_for(&el.tag);
                if rule == Rule::Skip {
                    continue;
                }
                let inline = matches!(
                    rule,
                    Rule::Unwrap | Rule::Code | Rule::Link | Rule::Image | Rule::Emphasis(_)
                );
                if !inline {
                    out.push(' ');
                }
                flat_text(&el.children, out);
                if !inline {
                    out.push(' ');
                }
            }
        }
    }
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn list_item(marker: &str, body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    let pad = " ".repeat(marker.len());
    body.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!("{}{}", marker, line)
            } else if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check if content is HTML based on content type and body
pub fn is_html(content_type: &str, body: &str) -> bool {
    let ct_lower = content_type.to_lowercase();
    if ct_lower.contains("text/html") || ct_lower.contains("application/xhtml") {
        return true;
    }
    if ct_lower.starts_with("text/plain") {
        return false;
    }

    // Check body start
    let trimmed = body.trim_start();
    let head: String = trimmed.chars().take(15).collect::<String>().to_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return true;
    }

    // Untyped fragments that open with a tag
    ct_lower.trim().is_empty() && starts_with_tag(trimmed)
}

fn starts_with_tag(body: &str) -> bool {
    let mut chars = body.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Parse, sanitize and convert an HTML page in one step
pub fn html_to_markdown(html: &str, base: Option<&Url>) -> String {
    let document = parse_document(html);
    let content = ContentSanitizer::new().sanitize(&document);
    let converter = match base {
        Some(base) => MarkdownConverter::with_base_url(base.clone()),
        None => MarkdownConverter::new(),
    };
    converter.convert(&content)
}

/// Page title from the first matching title element, cleaned
pub fn extract_title(document: &Node) -> String {
    let root = match document.as_element() {
        Some(root) => root,
        None => return DEFAULT_TITLE.to_string(),
    };
    TITLE_MATCHERS
        .iter()
        .filter_map(|m| root.find(|el| m.matches(el) && !el.text_content().trim().is_empty()))
        .map(|el| clean_title(&el.text_content()))
        .next()
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// Collapse whitespace and strip site suffixes from a title
pub fn clean_title(raw: &str) -> String {
    let mut title = collapse_whitespace(raw);
    loop {
        // Pad so a title that is only a suffix is stripped too
        let padded = format!(" {}", title);
        match TITLE_SUFFIXES
            .iter()
            .find_map(|suffix| padded.strip_suffix(suffix))
        {
            Some(stripped) => title = stripped.trim().to_string(),
            None => break,
        }
    }
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Whitespace-separated token count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Filter excessive newlines: keep at most 2 consecutive newlines
pub fn filter_excessive_newlines(s: &str) -> String {
    let mut result = String::new();
    let mut newline_count = 0;

    for c in s.chars() {
        if c == '\n' {
            newline_count += 1;
            if newline_count <= 2 {
                result.push(c);
            }
        } else if c == '\r' {
            continue;
        } else {
            newline_count = 0;
            result.push(c);
        }
    }

    result
}
