pub mod extractor;
pub mod robots;


use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use indicatif::{ProgressBar, ProgressStyle};
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};
use ureq::Agent;
use url::Url;

use self::extractor::extract_page;
use self::robots::{RobotsTxt, fetch_robots_txt};

/// Crawler settings, applied to every request in a crawl session.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// User agent sent with every request and matched against robots.txt
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Minimum delay between consecutive requests in milliseconds
    pub rate_limit_ms: u64,
    /// How many times a retryable fetch is attempted again
    pub max_retries: u32,
    /// Pause between retry attempts in seconds
    pub retry_delay_seconds: u64,
}

impl Default for CrawlerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: "sitechat/0.1.0 (site indexer)".to_string(),
            timeout_seconds: 30,
            rate_limit_ms: 250,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

/// Blocking HTTP client that enforces the crawl rate limit and retries
/// transient failures.
#[derive(Debug)]
pub struct HttpClient {
    agent: Agent,
    config: CrawlerConfig,
    last_request_time: Option<Instant>,
}

impl HttpClient {
    #[inline]
    pub fn new(config: CrawlerConfig) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Self {
            agent,
            config,
            last_request_time: None,
        }
    }

    /// GET a URL as text, honoring the rate limit and retrying transient
    /// failures up to `max_retries` times.
    #[inline]
    pub fn get(&mut self, url: &str) -> Result<String> {
        self.apply_rate_limit();

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retry {} for {}", attempt, url);
                std::thread::sleep(Duration::from_secs(self.config.retry_delay_seconds));
            }

            match self.try_get(url) {
                Ok(body) => {
                    debug!("Fetched {} on attempt {}", url, attempt + 1);
                    return Ok(body);
                }
                Err(e) if is_retryable_error(&e) && attempt < self.config.max_retries => {
                    warn!("Transient failure fetching {}: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Giving up on {}: {}", url, e);
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    // Sleeps until at least rate_limit_ms has passed since the last request.
    fn apply_rate_limit(&mut self) {
        if let Some(last_time) = self.last_request_time {
            let elapsed = last_time.elapsed();
            let min_gap = Duration::from_millis(self.config.rate_limit_ms);

            if elapsed < min_gap {
                let pause = min_gap - elapsed;
                debug!("Rate limit: pausing {:?}", pause);
                std::thread::sleep(pause);
            }
        }

        self.last_request_time = Some(Instant::now());
    }

    fn try_get(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);

        match self.agent.get(url).call() {
            Ok(mut response) => {
                let body = response
                    .body_mut()
                    .read_to_string()
                    .with_context(|| format!("Failed to read response body from {}", url))?;
                debug!("Read {} bytes from {}", body.len(), url);
                Ok(body)
            }
            Err(ureq::Error::StatusCode(status)) => {
                debug!("GET {} returned status {}", url, status);
                Err(anyhow!("HTTP error {}", status))
            }
            Err(e) => Err(anyhow::Error::from(e))
                .with_context(|| format!("Failed to make HTTP request to {}", url)),
        }
    }
}

impl Default for HttpClient {
    #[inline]
    fn default() -> Self {
        Self::new(CrawlerConfig::default())
    }
}

/// Transport failures, 5xx responses, and 429 throttling are worth retrying;
/// everything else fails fast.
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("timeout")
        || error_str.contains("connection")
        || error_str.contains("network")
    {
        return true;
    }

    error_str.contains("http error 5") || error_str.contains("http error 429")
}

/// Validate and normalize a URL
#[inline]
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).with_context(|| format!("Invalid URL format: {}", url_str))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("URL must use HTTP or HTTPS scheme: {}", url_str));
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host: {}", url_str));
    }

    Ok(url)
}

/// Check if a URL should be crawled based on the seed URL's location
#[inline]
pub fn should_crawl_url(url: &Url, seed_url: &Url) -> bool {
    // Must be same scheme and host
    if url.scheme() != seed_url.scheme() || url.host() != seed_url.host() {
        return false;
    }

    // Must fall under the seed URL's directory
    let seed_path = normalize_path_for_filtering(seed_url.path());
    url.path().starts_with(seed_path.as_ref())
}

/// Normalize a URL path for filtering by removing a trailing filename
fn normalize_path_for_filtering(path: &str) -> Cow<'_, str> {
    if path.ends_with('/') {
        return Cow::Borrowed(path);
    }

    match path.rfind('/') {
        None => Cow::Owned(format!("{}/", path)),
        Some(last_slash) => {
            let (dir, last_segment) = path.split_at(last_slash + 1);
            if last_segment.contains('.') {
                // Looks like a filename, use the directory path
                Cow::Borrowed(dir)
            } else {
                Cow::Owned(format!("{}/", path))
            }
        }
    }
}

/// Extract all same-site links from HTML content
#[inline]
pub fn extract_links(html: &str, source_url: &Url, seed_url: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("a[href]")
        .map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;

    let mut links = Vec::new();

    for element in document.select(&link_selector) {
        if let Some(href) = element.value().attr("href") {
            // Skip non-HTTP(S) links
            if href.starts_with("mailto:") || href.starts_with("javascript:") || href.starts_with('#')
            {
                continue;
            }

            match source_url.join(href) {
                Ok(mut absolute_url) => {
                    absolute_url.set_fragment(None);
                    if should_crawl_url(&absolute_url, seed_url) {
                        links.push(absolute_url);
                    }
                }
                Err(e) => {
                    debug!(
                        "Failed to resolve URL '{}' relative to '{}': {}",
                        href, source_url, e
                    );
                }
            }
        }
    }

    links.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    links.dedup();

    debug!("Found {} same-site links on {}", links.len(), source_url);
    Ok(links)
}

/// A successfully crawled page, ready for chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledPage {
    /// The URL that was crawled
    pub url: Url,
    /// The extracted page title
    pub title: String,
    /// The extracted plain text
    pub text: String,
}

/// Counters accumulated over one crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlStats {
    /// Distinct URLs discovered, including the seed
    pub total_urls: usize,
    /// Pages fetched and extracted successfully
    pub successful_crawls: usize,
    /// Pages that failed to fetch or extract
    pub failed_crawls: usize,
    /// Pages skipped because robots.txt disallows them
    pub robots_blocked: usize,
    /// Wall-clock time of the whole crawl
    pub duration: Duration,
}

impl CrawlStats {
    #[inline]
    pub fn total_crawled(&self) -> usize {
        self.successful_crawls + self.failed_crawls + self.robots_blocked
    }
}

/// Breadth-first crawler bounded by link depth from the seed page.
pub struct SiteCrawler {
    http_client: HttpClient,
    config: CrawlerConfig,
}

impl SiteCrawler {
    /// Create a new site crawler
    #[inline]
    pub fn new(config: CrawlerConfig) -> Self {
        let http_client = HttpClient::new(config.clone());
        Self {
            http_client,
            config,
        }
    }

    /// Crawl from `seed_url`, following same-site links up to `max_depth`
    /// levels (depth 1 is the seed page alone).
    ///
    /// The seed page must be fetchable; failures on any other page are
    /// logged, counted, and skipped.
    #[inline]
    pub fn crawl(&mut self, seed_url: &str, max_depth: usize) -> Result<(Vec<CrawledPage>, CrawlStats)> {
        let start_time = Instant::now();
        let seed_url = validate_url(seed_url)?;
        if max_depth == 0 {
            bail!("max_depth must be at least 1");
        }

        info!("Starting crawl at {} (max depth {})", seed_url, max_depth);

        // An unreachable robots.txt means no restrictions
        let robots_txt = match fetch_robots_txt(&mut self.http_client, &seed_url) {
            Ok(robots) => robots,
            Err(e) => {
                warn!("Could not fetch robots.txt for {}: {}", seed_url, e);
                RobotsTxt::parse("")
            }
        };

        if !robots_txt.is_allowed(&seed_url, &self.config.user_agent) {
            bail!("Seed URL {} is blocked by robots.txt", seed_url);
        }

        let mut queue: VecDeque<(Url, usize)> = VecDeque::new();
        let mut discovered_urls = HashSet::new();

        queue.push_back((seed_url.clone(), 1));
        discovered_urls.insert(seed_url.as_str().to_string());

        let mut pages = Vec::new();
        let mut stats = CrawlStats {
            total_urls: 1,
            ..CrawlStats::default()
        };

        let bar = if console::user_attended_stderr() {
            ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Crawling {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_position(0);
        bar.set_length(1);

        while let Some((url, depth)) = queue.pop_front() {
            if !robots_txt.is_allowed(&url, &self.config.user_agent) {
                info!("Skipping {} (disallowed by robots.txt)", url);
                stats.robots_blocked += 1;
                bar.set_position(stats.total_crawled() as u64);
                continue;
            }

            bar.set_message(url.to_string());

            let is_seed = pages.is_empty() && stats.total_crawled() == 0;
            let html = match self.http_client.get(url.as_str()) {
                Ok(html) => html,
                Err(e) if is_seed => {
                    bar.finish_and_clear();
                    return Err(e).with_context(|| format!("Failed to fetch seed URL {}", url));
                }
                Err(e) => {
                    error!("Failed to crawl {}: {}", url, e);
                    stats.failed_crawls += 1;
                    bar.set_position(stats.total_crawled() as u64);
                    continue;
                }
            };

            let page = match extract_page(&html) {
                Ok(extracted) => CrawledPage {
                    url: url.clone(),
                    title: extracted.title,
                    text: extracted.text,
                },
                Err(e) if is_seed => {
                    bar.finish_and_clear();
                    return Err(e)
                        .with_context(|| format!("Failed to extract content from seed URL {}", url));
                }
                Err(e) => {
                    error!("Content extraction failed for {}: {}", url, e);
                    stats.failed_crawls += 1;
                    bar.set_position(stats.total_crawled() as u64);
                    continue;
                }
            };

            debug!("Crawled {}", url);
            pages.push(page);
            stats.successful_crawls += 1;
            bar.set_position(stats.total_crawled() as u64);

            if depth < max_depth {
                // A page whose links cannot be parsed is still indexed
                let links = match extract_links(&html, &url, &seed_url) {
                    Ok(links) => links,
                    Err(e) => {
                        warn!("Failed to extract links from {}: {}", url, e);
                        Vec::new()
                    }
                };

                for link in links {
                    let link_str = link.as_str();
                    if !discovered_urls.contains(link_str) {
                        discovered_urls.insert(link_str.to_string());
                        queue.push_back((link, depth + 1));
                        stats.total_urls += 1;
                        bar.set_length(stats.total_urls as u64);
                    }
                }
            }
        }

        stats.duration = start_time.elapsed();
        bar.finish_and_clear();

        info!(
            "Crawl completed: {} successful, {} failed, {} blocked by robots.txt, took {:?}",
            stats.successful_crawls, stats.failed_crawls, stats.robots_blocked, stats.duration
        );

        Ok((pages, stats))
    }
}
