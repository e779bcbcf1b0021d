//! robots.txt handling and the per-domain robots gate
//!
//! Each domain's robots.txt is fetched once, on the first URL checked for it,
//! and cached for the rest of the crawl. A missing or unreachable file means
//! everything is allowed; that is logged once per domain.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::fetcher::Fetcher;
use super::url_filter::domain_key;

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<Duration>,
}

/// Parsed robots.txt
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
    sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Rules that allow everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Self {
        let mut rules = RobotsRules::default();
        let mut current: Option<Group> = None;
        // Consecutive user-agent lines share one group
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            rules.groups.push(group);
                        }
                        current = Some(Group::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                    collecting_agents = true;
                }
                "allow" | "disallow" | "crawl-delay" => {
                    collecting_agents = false;
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    match directive.as_str() {
                        "allow" if !value.is_empty() => group.allow.push(value.to_string()),
                        "disallow" if !value.is_empty() => group.disallow.push(value.to_string()),
                        "crawl-delay" => {
                            if let Ok(secs) = value.parse::<f64>() {
                                if secs.is_finite() && secs >= 0.0 {
                                    group.crawl_delay = Some(Duration::from_secs_f64(secs));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                "sitemap" => {
                    // `Sitemap:` values contain a colon of their own
                    if let Some((_, url)) = line.split_once(':') {
                        let url = url.trim();
                        if !url.is_empty() {
                            rules.sitemaps.push(url.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(group) = current {
            rules.groups.push(group);
        }
        rules
    }

    /// The group for `user_agent`: the longest agent token it contains, else `*`
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let ua = user_agent.to_ascii_lowercase();
        let product = ua.split(['/', ' ']).next().unwrap_or_default().to_string();

        let mut best: Option<(&Group, usize)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                if agent != "*" && !agent.is_empty() && (product == *agent || ua.contains(agent.as_str())) {
                    if best.map_or(true, |(_, len)| agent.len() > len) {
                        best = Some((group, agent.len()));
                    }
                }
            }
        }
        best.map(|(g, _)| g)
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
    }

    /// Whether `path` (with query) may be fetched by `user_agent`.
    ///
    /// The longest matching pattern wins; on a tie Allow wins.
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };
        if path == "/robots.txt" {
            return true;
        }
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| pattern_matches(path, p))
                .map(|p| p.len())
                .max()
        };
        match (longest(&group.allow), longest(&group.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent).and_then(|g| g.crawl_delay)
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Match a robots pattern (`*` wildcard, trailing `$` anchor) against a path prefix
fn pattern_matches(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let path = path.as_bytes();
    let pattern = pattern.as_bytes();

    // Iterative glob with single-star backtracking
    let (mut p, mut s) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    loop {
        if p == pattern.len() {
            if !anchored || s == path.len() {
                return true;
            }
        } else if pattern[p] == b'*' {
            star = Some((p, s));
            p += 1;
            continue;
        } else if s < path.len() && pattern[p] == path[s] {
            p += 1;
            s += 1;
            continue;
        }
        match star {
            Some((sp, ss)) if ss < path.len() => {
                star = Some((sp, ss + 1));
                p = sp + 1;
                s = ss + 1;
            }
            _ => return false,
        }
    }
}

/// Lazily-populated robots cache shared by every worker
pub struct RobotsGate {
    fetcher: Arc<dyn Fetcher>,
    user_agent: String,
    timeout: Duration,
    rules: RwLock<HashMap<String, Arc<RobotsRules>>>,
}

impl RobotsGate {
    pub fn new(fetcher: Arc<dyn Fetcher>, user_agent: &str, timeout: Duration) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.to_string(),
            timeout,
            rules: RwLock::new(HashMap::new()),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Rules for the domain of `url`, fetching robots.txt on first use
    pub async fn rules_for(&self, url: &Url) -> Arc<RobotsRules> {
        let Some(domain) = domain_key(url) else {
            return Arc::new(RobotsRules::allow_all());
        };
        if let Some(rules) = self.rules.read().get(&domain) {
            return rules.clone();
        }

        let rules = Arc::new(self.fetch_rules(url, &domain).await);
        self.rules.write().entry(domain).or_insert(rules).clone()
    }

    /// robots.txt comes from the host the URL names, `www.` included
    async fn fetch_rules(&self, url: &Url, domain: &str) -> RobotsRules {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(e) => {
                warn!(domain, "Cannot build robots.txt URL, allowing all: {}", e);
                return RobotsRules::allow_all();
            }
        };
        match self.fetcher.fetch(&robots_url, self.timeout).await {
            Ok(response) if response.status == 200 => {
                let rules = RobotsRules::parse(&String::from_utf8_lossy(&response.body));
                debug!(domain, groups = rules.groups.len(), sitemaps = rules.sitemaps.len(), "Loaded robots.txt");
                rules
            }
            Ok(response) => {
                warn!(domain, status = response.status, "robots.txt unavailable, allowing all");
                RobotsRules::allow_all()
            }
            Err(e) => {
                warn!(domain, error = %e, "robots.txt fetch failed, allowing all");
                RobotsRules::allow_all()
            }
        }
    }

    /// Whether `url` may be fetched by `user_agent`
    pub async fn allowed(&self, url: &Url, user_agent: &str) -> bool {
        let rules = self.rules_for(url).await;
        let target = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        rules.is_allowed(&target, user_agent)
    }

    /// Crawl-delay for `domain`, once its robots.txt has been loaded
    pub fn crawl_delay(&self, domain: &str) -> Option<Duration> {
        self.rules
            .read()
            .get(domain)
            .and_then(|r| r.crawl_delay(&self.user_agent))
    }

    /// Sitemaps advertised for `domain`, once its robots.txt has been loaded
    pub fn sitemap_urls(&self, domain: &str) -> Vec<Url> {
        self.rules
            .read()
            .get(domain)
            .map(|r| r.sitemaps().iter().filter_map(|s| Url::parse(s).ok()).collect())
            .unwrap_or_default()
    }
}
