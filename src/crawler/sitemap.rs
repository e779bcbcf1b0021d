//! Best-effort sitemap discovery
//!
//! Handles `<urlset>` files and nested `<sitemapindex>` files. Every failure
//! is swallowed: sitemaps only add seeds, they are never required.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::fetcher::Fetcher;

/// Parsed sitemap file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapDocument {
    /// Page locations from a `<urlset>`
    pub urls: Vec<String>,
    /// Child sitemaps from a `<sitemapindex>`
    pub sitemaps: Vec<String>,
}

/// Caps applied to one domain's discovery
#[derive(Debug, Clone, Copy)]
pub struct SitemapLimits {
    pub max_sitemaps: usize,
    pub max_urls: usize,
}

pub fn parse_sitemap(body: &[u8]) -> Result<SitemapDocument, quick_xml::Error> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::with_capacity(4096);
    let mut doc = SitemapDocument::default();

    // Parent element of the current <loc>: "url" or "sitemap"
    let mut parent: Option<String> = None;
    let mut in_loc = false;
    let mut text_buf = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "url" | "sitemap" => parent = Some(name),
                    "loc" => {
                        in_loc = true;
                        text_buf.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) if in_loc => {
                if let Ok(text) = e.unescape() {
                    text_buf.push_str(&text);
                }
            }
            Event::CData(ref e) if in_loc => {
                text_buf.push_str(&String::from_utf8_lossy(e));
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "loc" => {
                        in_loc = false;
                        let loc = text_buf.trim();
                        if !loc.is_empty() {
                            match parent.as_deref() {
                                Some("sitemap") => doc.sitemaps.push(loc.to_string()),
                                Some("url") => doc.urls.push(loc.to_string()),
                                _ => {}
                            }
                        }
                    }
                    "url" | "sitemap" => parent = None,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(doc)
}

/// Collect page URLs from the given sitemaps, or from `/sitemap.xml` when
/// robots.txt advertised none.
pub async fn discover(
    fetcher: &dyn Fetcher,
    advertised: Vec<Url>,
    fallback: Url,
    timeout: Duration,
    limits: SitemapLimits,
) -> Vec<String> {
    let mut queue: VecDeque<Url> = if advertised.is_empty() {
        VecDeque::from([fallback])
    } else {
        advertised.into()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut urls = Vec::new();
    let mut fetched = 0;

    while let Some(sitemap_url) = queue.pop_front() {
        if fetched >= limits.max_sitemaps || urls.len() >= limits.max_urls {
            break;
        }
        if !seen.insert(sitemap_url.to_string()) {
            continue;
        }
        fetched += 1;

        let response = match fetcher.fetch(&sitemap_url, timeout).await {
            Ok(r) if r.status == 200 => r,
            Ok(r) => {
                debug!(url = %sitemap_url, status = r.status, "Sitemap unavailable");
                continue;
            }
            Err(e) => {
                debug!(url = %sitemap_url, error = %e, "Sitemap fetch failed");
                continue;
            }
        };
        let doc = match parse_sitemap(&response.body) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(url = %sitemap_url, "Sitemap parse failed: {}", e);
                continue;
            }
        };

        for loc in doc.urls {
            if urls.len() >= limits.max_urls {
                break;
            }
            urls.push(loc);
        }
        queue.extend(doc.sitemaps.iter().filter_map(|s| Url::parse(s).ok()));
    }

    debug!(sitemaps = fetched, urls = urls.len(), "Sitemap discovery finished");
    urls
}
