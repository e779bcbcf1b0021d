//! Page quality scoring
//!
//! The score is a weighted sum of six sub-scores, each a fraction in `[0, 1]`:
//!
//! | sub-score     | weight | measures                                        |
//! |---------------|--------|-------------------------------------------------|
//! | code          | 25     | fenced blocks and code-like lines               |
//! | clarity       | 20     | enough prose to explain something               |
//! | structure     | 15     | headings, lists, paragraph breaks               |
//! | length        | 10     | sweet spot 100-2000 words, mild penalty beyond  |
//! | uniqueness    | 15     | vocabulary variety                              |
//! | completeness  | 15     | examples, explanation, not truncated            |
//!
//! A boilerplate penalty of up to 30 points is subtracted, tutorials,
//! examples and guides get a 10% bonus, and a page in a language outside the
//! allowed set scores 0. Scoring is pure; acceptance is `value >= threshold`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use super::language::{detect_language, primary_subtag};
use crate::config::QualityConfig;

pub const CODE_WEIGHT: f32 = 25.0;
pub const CLARITY_WEIGHT: f32 = 20.0;
pub const STRUCTURE_WEIGHT: f32 = 15.0;
pub const LENGTH_WEIGHT: f32 = 10.0;
pub const UNIQUENESS_WEIGHT: f32 = 15.0;
pub const COMPLETENESS_WEIGHT: f32 = 15.0;
pub const BOILERPLATE_PENALTY: f32 = 30.0;
pub const CONTENT_TYPE_BONUS: f32 = 1.1;

const BOILERPLATE_PHRASES: &[&str] = &[
    "click here", "read more", "subscribe", "newsletter", "follow us", "share this",
    "related posts", "comments", "copyright", "all rights reserved", "privacy policy",
    "terms of service", "cookie policy", "advertisement", "sign up", "log in", "create account",
    "join now", "follow @", "tweet this", "share on facebook", "accept cookies", "skip to content",
];

const CODE_TOKENS: &[&str] = &[
    "def ", "class ", "import ", "function ", ">>>", "print(", "return ", "const ", "let ",
    "var ", "public ", "private ", "void ", "fn ", "=>", "();", "#include", "$ ",
];

/// Coarse genre of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Tutorial,
    Example,
    Reference,
    Guide,
    General,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tutorial => "tutorial",
            Self::Example => "example",
            Self::Reference => "reference",
            Self::Guide => "guide",
            Self::General => "general",
        }
    }

    fn earns_bonus(&self) -> bool {
        matches!(self, Self::Tutorial | Self::Example | Self::Guide)
    }

    /// Classify from title, URL and fence count
    pub fn classify(text: &str, url: &str, title: &str) -> Self {
        let title = title.to_lowercase();
        let url = url.to_lowercase();
        let in_either = |kws: &[&str]| kws.iter().any(|k| title.contains(k) || url.contains(k));

        if in_either(&["tutorial", "getting started", "getting-started", "how to", "how-to", "learn"]) {
            Self::Tutorial
        } else if ["example", "cookbook", "recipe", "sample"].iter().any(|k| title.contains(k))
            || text.matches("```").count() > 6
        {
            Self::Example
        } else if in_either(&["reference", "api", "documentation", "method", "function", "class", "module"]) {
            Self::Reference
        } else if ["guide", "overview", "best practices", "tips"].iter().any(|k| title.contains(k)) {
            Self::Guide
        } else {
            Self::General
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scorer knows about a page besides its text
#[derive(Debug, Clone, Copy)]
pub struct PageMetadata<'a> {
    pub url: &'a str,
    pub title: &'a str,
    /// Language declared by the page, if any
    pub language: Option<&'a str>,
}

/// Result of scoring one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Composite score in `[0, 100]`, one decimal
    pub value: f32,
    /// Human-readable account of each contribution
    pub reasons: Vec<String>,
    pub content_kind: ContentKind,
    /// Language used for the language check
    pub language: Option<String>,
    pub boilerplate_ratio: f32,
}

/// Reasons a page fails before its score matters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRejection {
    Empty,
    TooShort { words: usize, chars: usize },
    Boilerplate,
    Language { found: String },
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::TooShort { words, chars } => write!(f, "too_short ({} words, {} chars)", words, chars),
            Self::Boilerplate => write!(f, "boilerplate"),
            Self::Language { found } => write!(f, "language ({})", found),
        }
    }
}

/// `score.value >= threshold`
pub fn accept(score: &QualityScore, threshold: f32) -> bool {
    score.value >= threshold
}

/// Deterministic page scorer for one domain's acceptance policy
#[derive(Debug, Clone)]
pub struct QualityScorer {
    allowed_languages: Vec<String>,
    min_word_count: usize,
    min_char_count: usize,
    max_boilerplate_ratio: f32,
}

impl QualityScorer {
    pub fn new(config: &QualityConfig, allowed_languages: &[String]) -> Self {
        Self {
            allowed_languages: allowed_languages.iter().filter_map(|l| primary_subtag(l)).collect(),
            min_word_count: config.min_word_count,
            min_char_count: config.min_char_count,
            max_boilerplate_ratio: config.max_boilerplate_ratio,
        }
    }

    /// Language of the page: the declared one, else a guess from the text
    pub fn page_language(text: &str, meta: &PageMetadata<'_>) -> Option<String> {
        meta.language
            .and_then(primary_subtag)
            .or_else(|| detect_language(text))
    }

    fn language_allowed(&self, language: Option<&str>) -> bool {
        match language {
            _ if self.allowed_languages.is_empty() => true,
            // Undetectable language is not held against the page
            None => true,
            Some(lang) => self.allowed_languages.iter().any(|l| l == lang),
        }
    }

    /// Hard gates checked before scoring: empty, too short, boilerplate, language
    pub fn gate(&self, text: &str, meta: &PageMetadata<'_>) -> Option<GateRejection> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Some(GateRejection::Empty);
        }
        let words = trimmed.split_whitespace().count();
        let chars = trimmed.chars().count();
        if words < self.min_word_count || chars < self.min_char_count {
            return Some(GateRejection::TooShort { words, chars });
        }
        if boilerplate_ratio(trimmed) > self.max_boilerplate_ratio {
            return Some(GateRejection::Boilerplate);
        }
        let language = Self::page_language(trimmed, meta);
        if !self.language_allowed(language.as_deref()) {
            return Some(GateRejection::Language {
                found: language.unwrap_or_default(),
            });
        }
        None
    }

    pub fn score(&self, text: &str, meta: &PageMetadata<'_>) -> QualityScore {
        let language = Self::page_language(text, meta);
        let boilerplate = boilerplate_ratio(text);
        let content_kind = ContentKind::classify(text, meta.url, meta.title);
        let mut reasons = Vec::new();

        if !self.language_allowed(language.as_deref()) {
            reasons.push(format!(
                "language '{}' not in allowed set [{}]",
                language.as_deref().unwrap_or("unknown"),
                self.allowed_languages.join(", ")
            ));
            return QualityScore {
                value: 0.0,
                reasons,
                content_kind,
                language,
                boilerplate_ratio: boilerplate,
            };
        }

        let stats = TextStats::new(text);

        let code = code_score(&stats);
        let clarity = clarity_score(stats.word_count);
        let structure = structure_score(&stats);
        let length = length_score(stats.word_count);
        let uniqueness = uniqueness_score(&stats);
        let completeness = completeness_score(text, &stats);

        let parts = [
            ("code", code, CODE_WEIGHT),
            ("clarity", clarity, CLARITY_WEIGHT),
            ("structure", structure, STRUCTURE_WEIGHT),
            ("length", length, LENGTH_WEIGHT),
            ("uniqueness", uniqueness, UNIQUENESS_WEIGHT),
            ("completeness", completeness, COMPLETENESS_WEIGHT),
        ];
        let mut total = 0.0f32;
        for (name, fraction, weight) in parts {
            let points = fraction * weight;
            total += points;
            reasons.push(format!("{}: {:.1}/{:.0}", name, points, weight));
        }

        let penalty = boilerplate * BOILERPLATE_PENALTY;
        if penalty > 0.0 {
            total -= penalty;
            reasons.push(format!("boilerplate: -{:.1}", penalty));
        }

        if content_kind.earns_bonus() {
            total *= CONTENT_TYPE_BONUS;
            reasons.push(format!("{} bonus: x{}", content_kind, CONTENT_TYPE_BONUS));
        }

        let value = (total.clamp(0.0, 100.0) * 10.0).round() / 10.0;
        QualityScore {
            value,
            reasons,
            content_kind,
            language,
            boilerplate_ratio: boilerplate,
        }
    }
}

struct TextStats<'a> {
    words: Vec<&'a str>,
    word_count: usize,
    code_blocks: usize,
    code_lines: usize,
    total_lines: usize,
    has_code_tokens: bool,
    headings: usize,
    list_items: usize,
    paragraph_breaks: usize,
}

static RE_LIST_ITEM: OnceLock<Regex> = OnceLock::new();

fn list_item_re() -> &'static Regex {
    RE_LIST_ITEM.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+\S").unwrap())
}

impl<'a> TextStats<'a> {
    fn new(text: &'a str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut in_fence = false;
        let mut fences = 0usize;
        let mut code_lines = 0usize;
        let mut total_lines = 0usize;
        let mut headings = 0usize;
        let mut list_items = 0usize;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                fences += 1;
                in_fence = !in_fence;
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }
            total_lines += 1;
            if in_fence || line.starts_with("    ") || line.starts_with('\t') {
                code_lines += 1;
            } else if trimmed.starts_with('#') && trimmed.trim_start_matches('#').starts_with(' ') {
                headings += 1;
            } else if list_item_re().is_match(line) {
                list_items += 1;
            }
        }

        Self {
            word_count: words.len(),
            words,
            code_blocks: fences / 2,
            code_lines,
            total_lines,
            has_code_tokens: CODE_TOKENS.iter().any(|t| text.contains(t)),
            headings,
            list_items,
            paragraph_breaks: text.matches("\n\n").count(),
        }
    }

    fn code_density(&self) -> f32 {
        if self.total_lines == 0 {
            0.0
        } else {
            self.code_lines as f32 / self.total_lines as f32
        }
    }

    fn has_code(&self) -> bool {
        self.code_blocks > 0 || self.code_lines > 0 || self.has_code_tokens
    }
}

fn code_score(stats: &TextStats<'_>) -> f32 {
    if !stats.has_code() {
        return 0.0;
    }
    // 0.4 for any code, 0.2 per fenced block, plus the share of code lines
    (0.4 + 0.2 * stats.code_blocks as f32 + stats.code_density()).min(1.0)
}

fn clarity_score(words: usize) -> f32 {
    match words {
        0..=49 => 0.0,
        50..=149 => 0.5,
        150..=499 => 0.75,
        _ => 1.0,
    }
}

fn structure_score(stats: &TextStats<'_>) -> f32 {
    let mut points = 0.0;
    if stats.headings > 0 {
        points += 7.0;
    }
    if stats.list_items > 0 {
        points += 4.0;
    }
    if stats.paragraph_breaks > 2 {
        points += 4.0;
    }
    points / 15.0
}

fn length_score(words: usize) -> f32 {
    match words {
        101..=1999 => 1.0,
        51..=100 | 2000..=2999 => 0.7,
        _ => 0.3,
    }
}

fn uniqueness_score(stats: &TextStats<'_>) -> f32 {
    let unique: HashSet<String> = stats
        .words
        .iter()
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();
    let ratio = unique.len() as f32 / stats.word_count.max(1) as f32;
    if ratio > 0.5 {
        1.0
    } else if ratio > 0.3 {
        2.0 / 3.0
    } else {
        1.0 / 3.0
    }
}

fn completeness_score(text: &str, stats: &TextStats<'_>) -> f32 {
    let mut points = 0.0;
    if stats.has_code() || text.to_lowercase().contains("example") {
        points += 7.0;
    }
    if stats.word_count > 100 {
        points += 5.0;
    }
    if !text.trim_end().ends_with("...") {
        points += 3.0;
    }
    points / 15.0
}

/// Share of the text made of navigation, footer and promotion phrases
pub fn boilerplate_ratio(text: &str) -> f32 {
    let total = text.len();
    if total == 0 {
        return 1.0;
    }
    let lower = text.to_lowercase();
    let boilerplate: usize = BOILERPLATE_PHRASES
        .iter()
        .map(|p| p.len() * lower.matches(p).count())
        .sum();
    (boilerplate as f32 / total as f32).min(1.0)
}
