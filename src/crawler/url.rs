//! Results-page URL construction
//!
//! Dated pages live at `{base}/{code}/{year}/{month}/{day}` with the
//! jurisdiction code lowercased and no zero padding; the latest results for a
//! jurisdiction live at `{base}/{code}`.

use chrono::{Datelike, NaiveDate};
use url::Url;

use crate::utils::error::FetchError;

/// Builds results-page URLs against a site root
#[derive(Debug, Clone)]
pub struct ResultsUrlBuilder {
    base: Url,
}

impl ResultsUrlBuilder {
    /// Create a builder for `base` (scheme and host, optionally a path prefix)
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if `base` is not an absolute http(s) URL
    pub fn new(base: &str) -> Result<Self, FetchError> {
        let trimmed = base.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base.to_string()));
        }

        Ok(Self { base: parsed })
    }

    fn root(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Site root, where the jurisdiction menu is published
    pub fn home(&self) -> String {
        format!("{}/", self.root())
    }

    /// Page for one jurisdiction and date
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use lottoharvest::crawler::url::ResultsUrlBuilder;
    ///
    /// let urls = ResultsUrlBuilder::new("https://www.lotterycorner.com").unwrap();
    /// let date = NaiveDate::from_ymd_opt(2025, 5, 3).unwrap();
    /// assert_eq!(urls.for_date("NY", date), "https://www.lotterycorner.com/ny/2025/5/3");
    /// ```
    pub fn for_date(&self, code: &str, date: NaiveDate) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.root(),
            code.trim().to_lowercase(),
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Latest results page for one jurisdiction
    pub fn latest(&self, code: &str) -> String {
        format!("{}/{}", self.root(), code.trim().to_lowercase())
    }

    /// Resolve a possibly relative reference found in a page
    ///
    /// References that cannot be resolved are returned unchanged.
    pub fn absolutize(&self, reference: &str) -> String {
        match Url::parse(reference) {
            Ok(url) => url.to_string(),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .join(reference)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| reference.to_string()),
            Err(_) => reference.to_string(),
        }
    }
}
