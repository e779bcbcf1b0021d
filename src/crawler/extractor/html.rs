//! HTML to structured text

use scraper::{ElementRef, Html, Node, Selector};

use super::{ContentExtractor, ExtractError, ExtractedPage};

/// Elements whose content never belongs to the page text
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside", "form",
    "button", "iframe", "select", "head",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "blockquote", "table", "tr", "dl", "dt", "dd",
    "figure", "figcaption", "details", "summary", "ul", "ol",
];

/// Extracts the main content of an HTML page as markdown-flavoured text
pub struct HtmlExtractor {
    content_selectors: Vec<Selector>,
    title_selector: Option<Selector>,
    h1_selector: Option<Selector>,
    og_title_selector: Option<Selector>,
    html_selector: Option<Selector>,
    language_selectors: Vec<(Selector, &'static str)>,
    link_selector: Option<Selector>,
    body_selector: Option<Selector>,
}

impl HtmlExtractor {
    pub fn new() -> Self {
        // Main content containers, most specific first
        let content_selectors = [
            "main",
            "article",
            "[role='main']",
            ".document",
            ".markdown-body",
            ".rst-content",
            ".content",
            "#content",
        ]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();

        let language_selectors = [
            ("meta[http-equiv='content-language']", "content"),
            ("meta[name='language']", "content"),
            ("meta[property='og:locale']", "content"),
        ]
        .iter()
        .filter_map(|(s, attr)| Selector::parse(s).ok().map(|sel| (sel, *attr)))
        .collect();

        Self {
            content_selectors,
            title_selector: Selector::parse("title").ok(),
            h1_selector: Selector::parse("h1").ok(),
            og_title_selector: Selector::parse("meta[property='og:title']").ok(),
            html_selector: Selector::parse("html").ok(),
            language_selectors,
            link_selector: Selector::parse("a[href]").ok(),
            body_selector: Selector::parse("body").ok(),
        }
    }

    fn extract_title(&self, document: &Html) -> String {
        let text_of = |sel: &Option<Selector>| {
            sel.as_ref()
                .and_then(|s| document.select(s).next())
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|t| !t.is_empty())
        };
        let og = self
            .og_title_selector
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(|el| el.value().attr("content"))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        text_of(&self.title_selector)
            .or(og)
            .or_else(|| text_of(&self.h1_selector))
            .unwrap_or_default()
    }

    fn extract_language(&self, document: &Html) -> Option<String> {
        let from_html = self
            .html_selector
            .as_ref()
            .and_then(|s| document.select(s).next())
            .and_then(|el| el.value().attr("lang").or_else(|| el.value().attr("xml:lang")))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if from_html.is_some() {
            return from_html;
        }
        self.language_selectors.iter().find_map(|(sel, attr)| {
            document
                .select(sel)
                .next()
                .and_then(|el| el.value().attr(attr))
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
        })
    }

    fn extract_links(&self, document: &Html) -> Vec<String> {
        let Some(sel) = &self.link_selector else {
            return Vec::new();
        };
        let mut links: Vec<String> = Vec::new();
        for el in document.select(sel) {
            if let Some(href) = el.value().attr("href") {
                let href = href.trim();
                if href.is_empty() || href.starts_with('#') || el.value().attr("rel").is_some_and(|r| r.contains("nofollow")) {
                    continue;
                }
                if !links.iter().any(|l| l == href) {
                    links.push(href.to_string());
                }
            }
        }
        links
    }

    /// Main content root: the first substantial content container, else `<body>`
    fn main_content<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        for sel in &self.content_selectors {
            if let Some(el) = document.select(sel).next() {
                if el.text().map(str::len).sum::<usize>() > 200 {
                    return Some(el);
                }
            }
        }
        self.body_selector
            .as_ref()
            .and_then(|s| document.select(s).next())
            .or_else(|| Some(document.root_element()))
    }
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for HtmlExtractor {
    fn extract(&self, body: &[u8], _content_type: &str) -> Result<ExtractedPage, ExtractError> {
        let html = String::from_utf8_lossy(body);
        if html.trim().is_empty() {
            return Err(ExtractError::NoContent);
        }
        let document = Html::parse_document(&html);

        let mut text = String::new();
        if let Some(root) = self.main_content(&document) {
            render(root, &mut text);
        }

        Ok(ExtractedPage {
            text: tidy(&text),
            title: self.extract_title(&document),
            language: self.extract_language(&document),
            links: self.extract_links(&document),
        })
    }
}

fn block_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    if out.ends_with('\n') {
        out.push('\n');
    } else {
        out.push_str("\n\n");
    }
}

fn line_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn push_inline(out: &mut String, raw: &str) {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        if raw.chars().any(char::is_whitespace) && !out.is_empty() && !out.ends_with([' ', '\n']) {
            out.push(' ');
        }
        return;
    }
    if raw.starts_with(char::is_whitespace) && !out.is_empty() && !out.ends_with([' ', '\n']) {
        out.push(' ');
    }
    out.push_str(&collapsed);
    if raw.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

/// Render an element subtree, keeping headings, list items and code blocks
fn render(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_inline(out, text),
            Node::Element(el) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                match name {
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        let level = name[1..].parse::<usize>().unwrap_or(1);
                        block_break(out);
                        out.push_str(&"#".repeat(level));
                        out.push(' ');
                        render(child_el, out);
                        block_break(out);
                    }
                    "pre" => {
                        let code: String = child_el.text().collect();
                        block_break(out);
                        out.push_str("```\n");
                        out.push_str(code.trim_matches('\n'));
                        out.push_str("\n```");
                        block_break(out);
                    }
                    "li" => {
                        line_break(out);
                        out.push_str("- ");
                        render(child_el, out);
                        line_break(out);
                    }
                    "br" => line_break(out),
                    "code" => {
                        let code: String = child_el.text().collect();
                        if !out.is_empty() && !out.ends_with([' ', '\n', '(']) {
                            out.push(' ');
                        }
                        out.push('`');
                        out.push_str(code.trim());
                        out.push('`');
                    }
                    _ if BLOCK_TAGS.contains(&name) => {
                        block_break(out);
                        render(child_el, out);
                        block_break(out);
                    }
                    _ => render(child_el, out),
                }
            }
            _ => {}
        }
    }
}

/// Trim trailing spaces and squeeze runs of blank lines outside code fences
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;
    let mut blank_run = 0;
    for line in text.lines() {
        let line = if in_fence { line } else { line.trim_end() };
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if line.trim().is_empty() && !in_fence {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(if in_fence { line } else { line.trim_start() });
    }
    out
}
