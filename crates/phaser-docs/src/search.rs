//! Documentation search over a catalogue of known pages
//!
//! Pages are scored by how many query terms appear in their title and
//! keywords, weighted by page priority.

use crate::error::DocsError;
use crate::types::SearchHit;
use tracing::{debug, warn};
use url::Url;

/// Longest query kept after sanitising, in characters
pub const MAX_QUERY_LENGTH: usize = 200;

/// Largest accepted `limit`
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Hits scoring below this are dropped
const MIN_SCORE: f64 = 0.1;

const TITLE_WEIGHT: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.7;

const SUSPICIOUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "data:",
    "vbscript:",
    "onload=",
    "onerror=",
    "eval(",
    "document.cookie",
    "window.location",
];

/// A known documentation page
#[derive(Debug, Clone, Copy)]
pub struct CataloguePage {
    /// Path relative to the documentation base URL
    pub path: &'static str,
    pub title: &'static str,
    pub priority: f64,
    pub keywords: &'static [&'static str],
}

pub const CATALOGUE: &[CataloguePage] = &[
    CataloguePage {
        path: "getting-started",
        title: "Getting Started with Phaser",
        priority: 1.0,
        keywords: &["getting", "started", "tutorial", "begin", "first", "game"],
    },
    CataloguePage {
        path: "sprites-and-images",
        title: "Working with Sprites and Images",
        priority: 0.9,
        keywords: &["sprite", "image", "texture", "display", "gameobject"],
    },
    CataloguePage {
        path: "scenes",
        title: "Understanding Scenes",
        priority: 0.9,
        keywords: &["scene", "state", "manager", "lifecycle"],
    },
    CataloguePage {
        path: "physics",
        title: "Physics Systems",
        priority: 0.8,
        keywords: &["physics", "arcade", "matter", "collision", "body"],
    },
    CataloguePage {
        path: "input-handling",
        title: "Input Handling",
        priority: 0.8,
        keywords: &["input", "keyboard", "mouse", "touch", "pointer"],
    },
    CataloguePage {
        path: "animations",
        title: "Animations and Tweens",
        priority: 0.8,
        keywords: &["animation", "tween", "timeline", "motion"],
    },
    CataloguePage {
        path: "audio",
        title: "Audio and Sound",
        priority: 0.7,
        keywords: &["audio", "sound", "music", "sfx", "webaudio"],
    },
    CataloguePage {
        path: "cameras",
        title: "Camera System",
        priority: 0.7,
        keywords: &["camera", "viewport", "zoom", "follow"],
    },
    CataloguePage {
        path: "tilemaps",
        title: "Tilemap Support",
        priority: 0.7,
        keywords: &["tilemap", "tile", "map", "tiled", "level"],
    },
    CataloguePage {
        path: "plugins",
        title: "Plugin System",
        priority: 0.6,
        keywords: &["plugin", "extend", "custom", "addon"],
    },
    CataloguePage {
        path: "api/scene",
        title: "Phaser.Scene API",
        priority: 0.9,
        keywords: &["scene", "api", "class", "method", "lifecycle"],
    },
    CataloguePage {
        path: "api/sprite",
        title: "Phaser.GameObjects.Sprite API",
        priority: 0.9,
        keywords: &["sprite", "gameobject", "api", "texture", "display"],
    },
    CataloguePage {
        path: "api/physics-arcade",
        title: "Phaser.Physics.Arcade API",
        priority: 0.8,
        keywords: &["physics", "arcade", "api", "body", "collision"],
    },
    CataloguePage {
        path: "api/input",
        title: "Phaser.Input API",
        priority: 0.8,
        keywords: &["input", "api", "keyboard", "mouse", "pointer"],
    },
    CataloguePage {
        path: "api/cameras",
        title: "Phaser.Cameras API",
        priority: 0.7,
        keywords: &["camera", "api", "viewport", "zoom"],
    },
];

/// Search index over [`CATALOGUE`], with URLs resolved against a base
#[derive(Debug, Clone)]
pub struct SearchIndex {
    base: Url,
}

impl SearchIndex {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Rank catalogue pages for `query`, best first
    ///
    /// Validates both parameters before doing anything else.
    pub fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, DocsError> {
        let query = sanitize_query(query)?;
        let limit = validate_limit(limit)?;
        let terms: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();

        let mut scored: Vec<(f64, &CataloguePage)> = CATALOGUE
            .iter()
            .map(|page| (score(page, &terms), page))
            .filter(|(score, _)| *score >= MIN_SCORE)
            .collect();
        // sort_by is stable: equal scores keep catalogue order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (score, page))| SearchHit {
                rank: i as u32 + 1,
                url: self.page_url(page),
                title: page.title.to_string(),
                snippet: Some(snippet(page, &terms)),
                relevance_score: Some((score * 1000.0).round() / 1000.0),
            })
            .collect();

        debug!(query = %query, limit, results = hits.len(), "Search completed");
        Ok(hits)
    }

    fn page_url(&self, page: &CataloguePage) -> String {
        self.base
            .join(page.path)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.base, page.path))
    }
}

/// Clean a raw query: control characters removed, trimmed, truncated
///
/// Fails on empty queries and on script-like content.
pub fn sanitize_query(query: &str) -> Result<String, DocsError> {
    let cleaned: String = query
        .chars()
        .filter_map(|c| match c {
            '\t' | '\n' | '\r' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    let mut cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        return Err(DocsError::InvalidArgument(
            "Search query cannot be empty".to_string(),
        ));
    }

    let len = cleaned.chars().count();
    if len > MAX_QUERY_LENGTH {
        warn!(
            event = "QUERY_TRUNCATION",
            from = len,
            to = MAX_QUERY_LENGTH,
            "SECURITY_EVENT: search query truncated"
        );
        cleaned = cleaned.chars().take(MAX_QUERY_LENGTH).collect();
    }

    let lower = cleaned.to_lowercase();
    if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| lower.contains(*p)) {
        warn!(
            event = "SUSPICIOUS_QUERY_PATTERN",
            pattern = %pattern,
            "SECURITY_EVENT: suspicious search query"
        );
        return Err(DocsError::InvalidArgument(
            "Search query contains suspicious content".to_string(),
        ));
    }

    Ok(cleaned)
}

/// `limit` must lie in 1..=100
pub fn validate_limit(limit: i64) -> Result<usize, DocsError> {
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(DocsError::InvalidArgument(format!(
            "limit must be between 1 and {}, got {}",
            MAX_SEARCH_LIMIT, limit
        )));
    }
    Ok(limit as usize)
}

fn score(page: &CataloguePage, terms: &[String]) -> f64 {
    (title_relevance(page.title, terms) * TITLE_WEIGHT
        + keyword_relevance(page.keywords, terms) * KEYWORD_WEIGHT)
        * page.priority
}

/// Share of terms contained in the title
fn title_relevance(title: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let title = title.to_lowercase();
    let matches = terms.iter().filter(|t| title.contains(t.as_str())).count();
    matches as f64 / terms.len() as f64
}

/// Exact keyword hits count 1, substring hits either way count 0.5; capped at 1
fn keyword_relevance(keywords: &[&str], terms: &[String]) -> f64 {
    if keywords.is_empty() || terms.is_empty() {
        return 0.0;
    }
    let matches: f64 = terms
        .iter()
        .map(|term| {
            if keywords.contains(&term.as_str()) {
                1.0
            } else if keywords.iter().any(|k| is_partial_match(k, term)) {
                0.5
            } else {
                0.0
            }
        })
        .sum();
    (matches / terms.len() as f64).min(1.0)
}

fn is_partial_match(keyword: &str, term: &str) -> bool {
    keyword.contains(term) || term.contains(keyword)
}

fn snippet(page: &CataloguePage, terms: &[String]) -> String {
    let mut matching: Vec<&str> = Vec::new();
    for term in terms {
        for keyword in page.keywords {
            if is_partial_match(keyword, term) && !matching.contains(keyword) {
                matching.push(*keyword);
            }
        }
    }

    if matching.is_empty() {
        return format!("Documentation page about {}.", page.title.to_lowercase());
    }

    let mut snippet = format!(
        "This page covers {}.",
        matching.iter().take(3).copied().collect::<Vec<_>>().join(", ")
    );
    if matching.len() > 3 {
        snippet.push_str(&format!(
            " Also includes information about {}.",
            matching[3..].iter().take(2).copied().collect::<Vec<_>>().join(", ")
        ));
    }
    snippet
}
