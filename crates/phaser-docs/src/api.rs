//! API reference extraction
//!
//! Walks a page in document order. A "Methods", "Properties" or "Examples"
//! heading opens a section that lasts until the next heading of the same or
//! higher level; sub-headings, list items and signature blocks inside it are
//! member names, `pre` blocks inside an examples section are examples.
//! Explicit markers (`.method-name`, `data-method`, `.example`, ...) are
//! honoured anywhere on the page.

use crate::dom::{collapse_whitespace, Element, Matcher, Node};
use crate::error::DocsError;
use crate::types::ApiReferenceRecord;
use tracing::debug;

/// Where the class name is looked for, highest priority first
const CLASS_NAME_MATCHERS: &[Matcher] = &[
    Matcher::Class("class-name"),
    Matcher::Class("api-title"),
    Matcher::Tag("h1"),
];

const DESCRIPTION_MATCHERS: &[Matcher] = &[
    Matcher::Class("class-description"),
    Matcher::Class("api-description"),
    Matcher::Class("description"),
    Matcher::Class("summary"),
];

const INHERITANCE_MATCHERS: &[Matcher] = &[
    Matcher::Class("inheritance"),
    Matcher::Class("extends"),
    Matcher::Class("parent-class"),
];

const METHOD_HEADINGS: &[&str] = &[
    "method",
    "methods",
    "public methods",
    "static methods",
    "inherited methods",
    "functions",
    "member functions",
];

const PROPERTY_HEADINGS: &[&str] = &[
    "property",
    "properties",
    "public properties",
    "static properties",
    "inherited properties",
    "members",
    "fields",
];

const EXAMPLE_HEADINGS: &[&str] = &["example", "examples", "usage", "usage examples", "code examples"];

const MODIFIERS: &[&str] = &[
    "static", "async", "readonly", "protected", "private", "public", "abstract", "get", "set",
    "function",
];

/// Longest accepted member name
const MAX_NAME_LEN: usize = 50;

/// Shortest description taken from a description-class element
const MIN_DESCRIPTION_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Methods,
    Properties,
    Examples,
}

#[derive(Debug, Default)]
struct Collected {
    methods: Vec<String>,
    properties: Vec<String>,
    examples: Vec<String>,
    /// Open section and the level of the heading that opened it
    section: Option<(Section, usize)>,
}

/// Extracts structured API reference records from class pages
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiExtractor;

impl ApiExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the record for the class documented by `document`
    ///
    /// Fails with [`DocsError::ClassNotFound`] if the page has no class
    /// heading.
    pub fn extract(&self, document: &Node, url: &str) -> Result<ApiReferenceRecord, DocsError> {
        let root = document
            .as_element()
            .ok_or_else(|| DocsError::ClassNotFound(format!("no class heading at {}", url)))?;

        let heading = CLASS_NAME_MATCHERS
            .iter()
            .find_map(|m| root.find(|el| m.matches(el) && !el.text_content().trim().is_empty()))
            .ok_or_else(|| DocsError::ClassNotFound(format!("no class heading at {}", url)))?;
        let class_name = collapse_whitespace(&heading.text_content());

        let mut collected = Collected::default();
        visit(root, &mut collected);
        if collected.examples.is_empty() {
            collected.examples = fallback_examples(root);
        }

        let namespace = class_name
            .rsplit_once('.')
            .map(|(ns, _)| ns.to_string())
            .filter(|ns| !ns.is_empty());

        debug!(
            class_name = %class_name,
            methods = collected.methods.len(),
            properties = collected.properties.len(),
            examples = collected.examples.len(),
            "Extracted API reference"
        );

        Ok(ApiReferenceRecord {
            description: description(root, heading),
            parent_class: parent_class(root),
            namespace,
            class_name,
            url: url.to_string(),
            methods: collected.methods,
            properties: collected.properties,
            examples: collected.examples,
        })
    }
}

fn visit(el: &Element, c: &mut Collected) {
    if let Some(level) = el.heading_level() {
        let text = collapse_whitespace(&el.text_content());
        if matches!(c.section, Some((_, open)) if level <= open) {
            c.section = None;
        }
        if let Some(section) = classify_heading(&text) {
            c.section = Some((section, level));
            return;
        }
        if collect_marked(el, c) {
            return;
        }
        match c.section {
            Some((Section::Methods, _)) => push_name(&mut c.methods, &text),
            Some((Section::Properties, _)) => push_name(&mut c.properties, &text),
            _ => {}
        }
        return;
    }

    if collect_marked(el, c) {
        return;
    }

    match (c.section, el.tag.as_str()) {
        (Some((Section::Examples, _)), "pre") => {
            push_example(&mut c.examples, &el.text_content());
            return;
        }
        (Some((Section::Methods, _)), "li" | "dt") => {
            push_name(&mut c.methods, &el.text_content());
            return;
        }
        (Some((Section::Properties, _)), "li" | "dt") => {
            push_name(&mut c.properties, &el.text_content());
            return;
        }
        (Some((section, _)), "tr") if section != Section::Examples => {
            if let Some(cell) = el.child_elements().find(|cell| cell.tag == "td") {
                let target = if section == Section::Methods {
                    &mut c.methods
                } else {
                    &mut c.properties
                };
                push_name(target, &cell.text_content());
            }
            return;
        }
        _ => {}
    }

    for child in el.child_elements() {
        visit(child, c);
    }
}

/// Handle elements explicitly marked as members or examples
fn collect_marked(el: &Element, c: &mut Collected) -> bool {
    if let Some(name) = el.attr("data-method") {
        let name = if name.trim().is_empty() { el.text_content() } else { name.to_string() };
        push_name(&mut c.methods, &name);
        return true;
    }
    if let Some(name) = el.attr("data-property") {
        let name = if name.trim().is_empty() { el.text_content() } else { name.to_string() };
        push_name(&mut c.properties, &name);
        return true;
    }
    if ["method-name", "function-name", "method-signature", "function-signature"]
        .iter()
        .any(|class| el.has_class(class))
    {
        push_name(&mut c.methods, &el.text_content());
        return true;
    }
    if ["property-name", "member-name"].iter().any(|class| el.has_class(class)) {
        push_name(&mut c.properties, &el.text_content());
        return true;
    }
    if ["method", "api-method", "function"].iter().any(|class| el.has_class(class)) {
        push_name(&mut c.methods, &container_name(el));
        return true;
    }
    if ["property", "api-property"].iter().any(|class| el.has_class(class)) {
        push_name(&mut c.properties, &container_name(el));
        return true;
    }
    if ["example", "code-example", "usage-example"]
        .iter()
        .any(|class| el.has_class(class))
    {
        let code = el
            .select_first(Matcher::Tag("pre"))
            .or_else(|| el.select_first(Matcher::Tag("code")))
            .unwrap_or(el);
        push_example(&mut c.examples, &code.text_content());
        return true;
    }
    false
}

/// Name of a member container: its heading or signature, else its first line
fn container_name(el: &Element) -> String {
    el.child_elements()
        .find(|child| {
            child.heading_level().is_some()
                || child.tag == "code"
                || child.has_class("method-name")
                || child.has_class("property-name")
                || child.has_class("signature")
        })
        .map(|child| child.text_content())
        .unwrap_or_else(|| {
            el.text_content()
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or_default()
                .to_string()
        })
}

fn classify_heading(text: &str) -> Option<Section> {
    let normalized = strip_paren_groups(text)
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_lowercase();
    if METHOD_HEADINGS.contains(&normalized.as_str()) {
        Some(Section::Methods)
    } else if PROPERTY_HEADINGS.contains(&normalized.as_str()) {
        Some(Section::Properties)
    } else if EXAMPLE_HEADINGS.contains(&normalized.as_str()) {
        Some(Section::Examples)
    } else {
        None
    }
}

fn push_name(list: &mut Vec<String>, raw: &str) {
    if let Some(name) = clean_member_name(raw) {
        if !list.contains(&name) {
            list.push(name);
        }
    }
}

fn push_example(list: &mut Vec<String>, raw: &str) {
    let code = raw.trim_start_matches(['\n', '\r']).trim_end();
    if !code.trim().is_empty() && !list.iter().any(|e| e == code) {
        list.push(code.to_string());
    }
}

/// Reduce a heading, list item or signature to a bare member name
///
/// `"<static> setTexture(key, [frame]) : this"` becomes `"setTexture"`.
/// Private (`_`-prefixed), overlong and non-identifier names are rejected.
fn clean_member_name(raw: &str) -> Option<String> {
    let text = strip_paren_groups(&collapse_whitespace(raw));
    let head = text.split([':', '=', '→']).next().unwrap_or_default();

    let token = head
        .split_whitespace()
        .find(|t| !(t.starts_with('<') && t.ends_with('>')) && !MODIFIERS.contains(t))?;
    // JSDoc style Class#member
    let token = token.rsplit('#').next().unwrap_or(token);
    let name = token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'));

    let valid = !name.is_empty()
        && !name.starts_with('_')
        && name.len() < MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.'))
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '$');
    valid.then(|| name.to_string())
}

/// Remove `( ... )` groups, including nested ones
fn strip_paren_groups(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Code-looking multi-line `pre` blocks, used when no examples are marked
fn fallback_examples(root: &Element) -> Vec<String> {
    let mut examples = Vec::new();
    root.walk(&mut |el| {
        if el.tag != "pre" {
            return;
        }
        let text = el.text_content();
        let code = text.trim();
        let looks_like_code = ["=", "(", "new ", "this.", "function"]
            .iter()
            .any(|marker| code.contains(marker));
        if code.lines().count() > 1 && looks_like_code {
            push_example(&mut examples, &text);
        }
    });
    examples
}

fn description(root: &Element, heading: &Element) -> String {
    let from_class = DESCRIPTION_MATCHERS.iter().find_map(|m| {
        root.find(|el| {
            m.matches(el) && collapse_whitespace(&el.text_content()).len() > MIN_DESCRIPTION_LEN
        })
    });
    if let Some(el) = from_class {
        return collapse_whitespace(&el.text_content());
    }

    let mut seen_heading = false;
    let mut found: Option<&Element> = None;
    root.walk(&mut |el| {
        if found.is_some() {
            return;
        }
        if std::ptr::eq(el, heading) {
            seen_heading = true;
        } else if seen_heading && el.tag == "p" && !el.text_content().trim().is_empty() {
            found = Some(el);
        }
    });
    found
        .map(|p| collapse_whitespace(&p.text_content()))
        .unwrap_or_default()
}

/// `X` from "extends X" in an inheritance block
fn parent_class(root: &Element) -> Option<String> {
    INHERITANCE_MATCHERS.iter().find_map(|m| {
        let el = root.select_first(*m)?;
        let text = collapse_whitespace(&el.text_content());
        let lower = text.to_lowercase();
        let pos = lower.find("extends")?;
        let rest = text[pos + "extends".len()..].trim_start();
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.'))
            .collect();
        let name = name.trim_end_matches('.').to_string();
        (!name.is_empty()).then_some(name)
    })
}

/// Render a record as Markdown
pub fn render_markdown(record: &ApiReferenceRecord) -> String {
    let mut parts = vec![format!("# {}", record.class_name)];

    if !record.description.is_empty() {
        parts.push(record.description.clone());
    }

    let mut meta = Vec::new();
    if let Some(ref parent) = record.parent_class {
        meta.push(format!("**Extends:** {}", parent));
    }
    if let Some(ref namespace) = record.namespace {
        meta.push(format!("**Namespace:** {}", namespace));
    }
    if !record.url.is_empty() {
        meta.push(format!("**Reference:** [{}]({})", record.url, record.url));
    }
    if !meta.is_empty() {
        parts.push(meta.join("\n"));
    }

    if !record.methods.is_empty() {
        parts.push("## Methods".to_string());
        parts.push(bullets(&record.methods));
    }
    if !record.properties.is_empty() {
        parts.push("## Properties".to_string());
        parts.push(bullets(&record.properties));
    }
    if !record.examples.is_empty() {
        parts.push("## Examples".to_string());
        for example in &record.examples {
            let fence = "`".repeat((longest_backtick_run(example) + 1).max(3));
            parts.push(format!("{}javascript\n{}\n{}", fence, example, fence));
        }
    }

    parts.join("\n\n")
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}
