//! HTML parsing and data extraction
//!
//! This module turns results pages into [`RawDrawRecord`]s and reads the
//! jurisdiction menu used by discovery. Extraction never fails: sections or
//! fields that cannot be read are left out.

pub mod draws;
pub mod selectors;
pub mod states;

pub use draws::{infer_time_from_name, DrawPageExtractor};
pub use states::{parse_jurisdiction_menu, MenuEntry};

use chrono::NaiveDate;

use crate::models::{Jurisdiction, RawDrawRecord};

/// Which date a fetched page describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDate {
    /// A dated page; every record takes this date
    Exact(NaiveDate),
    /// The latest page; records take the page's own date, or `fallback`
    Latest { fallback: NaiveDate },
}

/// Extraction boundary between fetched documents and the upsert engine
pub trait Extractor: Send + Sync {
    /// Extract the draw records of one page in document order
    fn extract(&self, html: &str, jurisdiction: &Jurisdiction, page: PageDate) -> Vec<RawDrawRecord>;
}
