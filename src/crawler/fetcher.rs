//! HTTP fetcher with rate limiting and charset detection
//!
//! This module provides the production [`PageFetcher`]:
//! - User-Agent rotation
//! - Rate limiting with governor
//! - Bounded per-request timeout
//! - Charset detection from the Content-Type header or the page's meta tag
//!
//! One call is one HTTP request. Retries are decided by the orchestrator from
//! the error kind.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT},
    Client, Response,
};
use std::num::NonZeroU32;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use super::{FetchedPage, PageFetcher};
use crate::config::CrawlerConfig;
use crate::utils::error::FetchError;

/// Fallback pool when the configuration lists no user agents
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Results-page fetcher
pub struct HttpFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Rotated per request
    user_agents: Vec<String>,
}

impl HttpFetcher {
    /// Create a fetcher
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(requests_per_second: u32, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Create a fetcher from the crawler settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let mut fetcher = Self::new(
            config.requests_per_second,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let agents: Vec<String> = config
            .user_agents
            .iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();
        if !agents.is_empty() {
            fetcher.user_agents = agents;
        }
        Ok(fetcher)
    }

    /// Map a transport failure onto the fetch error taxonomy
    fn classify(e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e)
        }
    }

    /// Decode a response body using its declared or sniffed charset
    async fn decode_response(&self, response: Response) -> Result<String, FetchError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await.map_err(Self::classify)?;

        Ok(decode_bytes(&bytes, &content_type))
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(self.random_user_agent()) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        headers
    }

    fn random_user_agent(&self) -> &str {
        let mut rng = rand::thread_rng();
        self.user_agents
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.rate_limiter.until_ready().await;
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status().as_u16();
        if FetchError::is_server_status(status) {
            return Err(FetchError::ServerError(status));
        }
        if !response.status().is_success() {
            return Err(FetchError::Status(status));
        }

        let body = self.decode_response(response).await?;
        Ok(FetchedPage {
            url: url.to_string(),
            status,
            body,
        })
    }
}

/// Decode bytes to a string
///
/// Tries, in order: the Content-Type charset, a `<meta charset>` in the first
/// kilobyte, then UTF-8 with a windows-1252 fallback for invalid sequences.
pub fn decode_bytes(bytes: &[u8], content_type: &str) -> String {
    if let Some(encoding) = charset_label(content_type).and_then(Encoding::for_label) {
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    if let Some(encoding) = meta_charset(&head).and_then(Encoding::for_label) {
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }

    let (text, _, had_errors) = UTF_8.decode(bytes);
    if had_errors {
        let (fallback, _, _) = WINDOWS_1252.decode(bytes);
        return fallback.into_owned();
    }
    text.into_owned()
}

fn charset_label(content_type: &str) -> Option<&[u8]> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').as_bytes())
        })
}

fn meta_charset(head: &str) -> Option<&[u8]> {
    static META_RE: OnceLock<Regex> = OnceLock::new();
    let re = META_RE.get_or_init(|| {
        Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#).expect("Invalid regex pattern")
    });
    re.captures(head)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_rotation() {
        let mut config = CrawlerConfig::default();
        config.user_agents = vec!["agent-a".into(), "agent-b".into()];
        let fetcher = HttpFetcher::from_config(&config).unwrap();

        let mut agents = std::collections::HashSet::new();
        for _ in 0..100 {
            agents.insert(fetcher.random_user_agent().to_string());
        }
        assert_eq!(agents.len(), 2, "User agents should rotate");
    }

    #[test]
    fn test_empty_agent_list_uses_defaults() {
        let mut config = CrawlerConfig::default();
        config.user_agents = vec!["  ".into()];
        let fetcher = HttpFetcher::from_config(&config).unwrap();
        assert!(DEFAULT_USER_AGENTS.contains(&fetcher.random_user_agent()));
    }

    #[test]
    fn test_decode_utf8() {
        let text = "Mega Millions – $20 Million";
        assert_eq!(decode_bytes(text.as_bytes(), "text/html; charset=utf-8"), text);
        assert_eq!(decode_bytes(text.as_bytes(), "text/html"), text);
    }

    #[test]
    fn test_decode_declared_latin1() {
        // "Café" in windows-1252
        let bytes: &[u8] = &[0x43, 0x61, 0x66, 0xe9];
        assert_eq!(decode_bytes(bytes, "text/html; charset=ISO-8859-1"), "Café");
    }

    #[test]
    fn test_decode_meta_charset() {
        let mut bytes = b"<html><head><meta charset=\"windows-1252\"></head><body>".to_vec();
        bytes.extend_from_slice(&[0x43, 0x61, 0x66, 0xe9]);
        assert!(decode_bytes(&bytes, "").ends_with("Café"));
    }

    #[test]
    fn test_decode_invalid_utf8_falls_back() {
        let bytes: &[u8] = &[0x24, 0x31, 0xa0, 0x4d];
        assert_eq!(decode_bytes(bytes, ""), "$1\u{a0}M");
    }

    #[test]
    fn test_build_headers() {
        let fetcher = HttpFetcher::new(10, Duration::from_secs(5)).unwrap();
        let headers = fetcher.build_headers();
        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(ACCEPT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }
}
