use anyhow::{Context, Result};
use tracing::{debug, warn};
use url::Url;

use super::HttpClient;

/// Parsed robots.txt rules, grouped by user agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Default)]
struct RuleGroup {
    /// Lowercased user-agent names this group applies to ("*" for everyone)
    agents: Vec<String>,
    /// Allow rules take precedence over disallow rules
    allowed: Vec<String>,
    disallowed: Vec<String>,
}

impl RobotsTxt {
    /// Parse robots.txt content. Unknown directives are ignored.
    #[inline]
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<RuleGroup> = Vec::new();
        // Consecutive User-agent lines share the group that follows them.
        let mut open_group = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((directive, value)) = parse_directive(line) else {
                continue;
            };

            match directive.to_lowercase().as_str() {
                "user-agent" => {
                    if open_group || groups.is_empty() {
                        groups.push(RuleGroup::default());
                        open_group = false;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                }
                "disallow" => {
                    open_group = true;
                    match groups.last_mut() {
                        Some(group) if !group.agents.is_empty() => {
                            if !value.is_empty() {
                                group.disallowed.push(value.to_string());
                            }
                        }
                        _ => warn!("Disallow directive without User-agent: {}", line),
                    }
                }
                "allow" => {
                    open_group = true;
                    match groups.last_mut() {
                        Some(group) if !group.agents.is_empty() => {
                            if !value.is_empty() {
                                group.allowed.push(value.to_string());
                            }
                        }
                        _ => warn!("Allow directive without User-agent: {}", line),
                    }
                }
                "crawl-delay" | "sitemap" => {
                    debug!("Ignoring robots.txt directive: {}: {}", directive, value);
                }
                _ => {
                    debug!("Unknown robots.txt directive: {}: {}", directive, value);
                }
            }
        }

        Self { groups }
    }

    /// Check if a URL may be crawled by the given user agent.
    ///
    /// The group addressed to this agent's product token wins over the `*`
    /// group; within a group, allow rules win over disallow rules. No
    /// matching rule means the URL is allowed.
    #[inline]
    pub fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let path = url.path();
        let token = product_token(user_agent);

        let group = self
            .groups
            .iter()
            .find(|group| group.agents.iter().any(|agent| agent == &token))
            .or_else(|| {
                self.groups
                    .iter()
                    .find(|group| group.agents.iter().any(|agent| agent == "*"))
            });

        let Some(group) = group else {
            return true;
        };

        for pattern in &group.allowed {
            if path_matches_pattern(path, pattern) {
                debug!("URL {} allowed by pattern: {}", url, pattern);
                return true;
            }
        }

        for pattern in &group.disallowed {
            if path_matches_pattern(path, pattern) {
                debug!("URL {} disallowed by pattern: {}", url, pattern);
                return false;
            }
        }

        true
    }

    /// The robots.txt URL for a site.
    #[inline]
    pub fn robots_url(base_url: &Url) -> Url {
        let mut robots_url = base_url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);
        robots_url
    }
}

/// Lowercased product name of a user agent string ("sitechat/0.1.0 (...)"
/// becomes "sitechat").
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or(user_agent)
        .to_lowercase()
}

/// Parse a robots.txt directive line, dropping inline comments.
fn parse_directive(line: &str) -> Option<(&str, &str)> {
    let (directive, value) = line.split_once(':')?;
    let value = value
        .split('#')
        .next()
        .unwrap_or_default()
        .trim();
    Some((directive.trim(), value))
}

/// Prefix matching with a trailing-wildcard allowance.
fn path_matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern == "/" {
        return true;
    }

    pattern.strip_suffix('*').map_or_else(
        || path.starts_with(pattern),
        |prefix| path.starts_with(prefix),
    )
}

/// Fetch and parse robots.txt for a site. A missing or unreachable
/// robots.txt allows everything.
#[inline]
pub fn fetch_robots_txt(http_client: &mut HttpClient, base_url: &Url) -> Result<RobotsTxt> {
    let robots_url = RobotsTxt::robots_url(base_url);

    debug!("Fetching {}", robots_url);

    match http_client.get(robots_url.as_str()) {
        Ok(content) => {
            debug!("Got robots.txt ({} bytes)", content.len());
            Ok(RobotsTxt::parse(&content))
        }
        Err(e) => {
            let error_str = e.to_string().to_lowercase();

            // A site without a robots.txt places no restrictions
            if error_str.contains("404") || error_str.contains("not found") {
                debug!("No robots.txt at {}", robots_url);
                Ok(RobotsTxt::parse(""))
            } else {
                Err(e).with_context(|| format!("Failed to fetch robots.txt from {}", robots_url))
            }
        }
    }
}
