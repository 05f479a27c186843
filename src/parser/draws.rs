//! Draw section extraction
//!
//! Each `div.card` section of a results page describes one game. Missing
//! fields yield `None` or an empty list; a malformed section is skipped
//! without failing the page.

use std::sync::OnceLock;

use chrono::{Local, NaiveDate, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, trace};

use super::selectors::DrawSelectors;
use super::{Extractor, PageDate};
use crate::crawler::url::ResultsUrlBuilder;
use crate::models::{DrawNumbers, DrawValues, Jurisdiction, RawDrawRecord};
use crate::utils::{normalize_whitespace, parse_date, parse_time, slugify};

/// Draw times implied by words in a game name, checked in order
const TIME_INDICATORS: &[(&str, (u32, u32))] = &[
    ("Midday", (12, 0)),
    ("Mid-day", (12, 0)),
    ("Noon", (12, 0)),
    ("Evening", (19, 0)),
    ("Eve", (19, 0)),
    ("Night", (22, 0)),
    ("Morning", (10, 0)),
    ("Afternoon", (16, 0)),
    ("Day", (13, 0)),
];

/// Games with a published draw time that differs from the generic indicator
const KNOWN_GAME_TIMES: &[(&str, (u32, u32))] = &[
    ("Lucky Day Lotto Midday", (12, 45)),
    ("Lucky Day Lotto Evening", (21, 22)),
    ("Daily 3 Midday", (13, 40)),
    ("Daily 3 Evening", (21, 22)),
    ("Daily 4 Midday", (13, 40)),
    ("Daily 4 Evening", (21, 22)),
    ("Fantasy 5 Midday", (12, 45)),
    ("Fantasy 5 Evening", (21, 22)),
    ("Pick 3 Midday", (12, 0)),
    ("Pick 3 Evening", (19, 0)),
    ("Pick 4 Midday", (12, 0)),
    ("Pick 4 Evening", (19, 0)),
];

fn timer_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d:]+\s*[AP]M)\s*([-+]\d{4})").expect("Invalid regex pattern"))
}

fn timer_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+), (\w+)-(\d+)-(\d{4})").expect("Invalid regex pattern"))
}

fn next_draw_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\w+), (\w+)-(\d+)-(\d{4}), ([\d:]+\s*[AP]M)").expect("Invalid regex pattern")
    })
}

fn loose_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z]{3,9})[ -](\d{1,2}),?[ -](\d{4})").expect("Invalid regex pattern")
    })
}

fn loose_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,2}[:.]\d{2}\s*(?:[AP]M)?|\d{1,2}\s*[AP]M)").expect("Invalid regex pattern")
    })
}

/// Build a date from `Month`, `day`, `year` captures
fn month_day_year(month: &str, day: &str, year: &str) -> Option<NaiveDate> {
    parse_date(&format!("{month} {day}, {year}"))
}

/// Date, time and offset read from the page itself
#[derive(Debug, Default)]
struct PageTiming {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    offset: Option<String>,
}

/// Extractor for lotterycorner results pages
pub struct DrawPageExtractor {
    selectors: DrawSelectors,
    urls: ResultsUrlBuilder,
}

impl DrawPageExtractor {
    /// Create an extractor resolving relative logo paths against `urls`
    pub fn new(urls: ResultsUrlBuilder) -> Self {
        Self {
            selectors: DrawSelectors::new(),
            urls,
        }
    }

    /// Extract one record from a section, or `None` if the section has no game
    fn extract_section(
        &self,
        section: ElementRef<'_>,
        jurisdiction: &Jurisdiction,
        page: PageDate,
    ) -> Option<RawDrawRecord> {
        let header = section.select(self.selectors.header).next()?;
        let body = section.select(self.selectors.body).next()?;

        let game_name = header
            .select(self.selectors.name)
            .next()
            .map(|h| normalize_whitespace(&h.text().collect::<String>()))
            .filter(|name| !name.is_empty())?;
        let game_slug = slugify(&game_name);
        if game_slug.is_empty() {
            debug!(name = %game_name, "Skipping section with unusable game name");
            return None;
        }

        let logo_ref = header
            .select(self.selectors.logo)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(|src| self.urls.absolutize(src));

        let timing = self.read_timing(body);
        let draw_date = match page {
            PageDate::Exact(date) => date,
            PageDate::Latest { fallback } => timing.date.unwrap_or(fallback),
        };
        let draw_time = timing.time.or_else(|| infer_time_from_name(&game_name));

        let (numbers, special_number) = self.read_numbers(body);
        let (next_draw_date, next_draw_time) = self.read_next_draw(body);

        let record = RawDrawRecord {
            game_name,
            game_slug,
            logo_ref,
            jurisdiction_id: jurisdiction.id,
            draw_date,
            draw_time,
            values: DrawValues {
                numbers,
                special_number,
                jackpot: self.labelled_amount(body, "JackPot:"),
                next_draw_date,
                next_draw_time,
                next_jackpot: self.read_next_jackpot(body),
                timezone_offset: timing.offset,
            },
        };
        trace!(slug = %record.game_slug, date = %record.draw_date, numbers = %record.values.numbers, "Extracted section");
        Some(record)
    }

    /// Draw date, time and timezone offset from the countdown timer, falling
    /// back to the amount title text
    fn read_timing(&self, body: ElementRef<'_>) -> PageTiming {
        let mut timing = PageTiming::default();

        if let Some(end) = body
            .select(self.selectors.timer)
            .next()
            .and_then(|timer| timer.value().attr("data-enddate"))
        {
            if let Some(caps) = timer_time_re().captures(end) {
                timing.time = parse_time(&caps[1]);
                timing.offset = Some(caps[2].to_string());
            }
            if let Some(caps) = timer_date_re().captures(end) {
                timing.date = month_day_year(&caps[2], &caps[3], &caps[4]);
            }
        }

        if timing.date.is_none() {
            if let Some(title) = body.select(self.selectors.amount_title).next() {
                let text = normalize_whitespace(&title.text().collect::<String>());
                timing.date = parse_date(&text).or_else(|| {
                    loose_date_re()
                        .captures(&text)
                        .and_then(|caps| month_day_year(&caps[1], &caps[2], &caps[3]))
                });
                if timing.time.is_none() {
                    timing.time = loose_time_re()
                        .captures(&text)
                        .and_then(|caps| parse_time(&caps[1]));
                }
            }
        }

        timing
    }

    /// Ordered numbers plus the special number
    ///
    /// The first highlighted ball is the special number; further highlighted
    /// balls follow the regular numbers.
    fn read_numbers(&self, body: ElementRef<'_>) -> (DrawNumbers, Option<String>) {
        let mut regular = Vec::new();
        let mut highlighted = Vec::new();

        for ball in body.select(self.selectors.number) {
            let text = normalize_whitespace(&ball.text().collect::<String>());
            if text.is_empty() {
                continue;
            }
            if ball.value().classes().any(|c| c == "highlighted") {
                highlighted.push(text);
            } else {
                regular.push(text);
            }
        }

        let mut extras = highlighted.into_iter();
        let special = extras.next();
        regular.extend(extras);

        (DrawNumbers(regular), special)
    }

    /// Item text of the `div.amounts` block carrying `label`
    fn labelled_amount(&self, body: ElementRef<'_>, label: &str) -> Option<String> {
        body.select(self.selectors.amounts)
            .find(|block| block.text().any(|t| t.contains(label)))
            .and_then(|block| block.select(self.selectors.item).next())
            .map(|item| normalize_whitespace(&item.text().collect::<String>()))
            .filter(|text| !text.is_empty())
    }

    fn read_next_jackpot(&self, body: ElementRef<'_>) -> Option<String> {
        self.labelled_amount(body, "Next Jackpot:").or_else(|| {
            body.select(self.selectors.highlighted_item)
                .map(|item| normalize_whitespace(&item.text().collect::<String>()))
                .find(|text| text.contains('$'))
        })
    }

    fn read_next_draw(&self, body: ElementRef<'_>) -> (Option<NaiveDate>, Option<NaiveTime>) {
        let Some(item) = body.select(self.selectors.next_date_item).next() else {
            return (None, None);
        };
        let text = normalize_whitespace(&item.text().collect::<String>());

        match next_draw_re().captures(&text) {
            Some(caps) => (
                month_day_year(&caps[2], &caps[3], &caps[4]),
                parse_time(&caps[5]),
            ),
            None => (None, None),
        }
    }
}

impl Extractor for DrawPageExtractor {
    fn extract(&self, html: &str, jurisdiction: &Jurisdiction, page: PageDate) -> Vec<RawDrawRecord> {
        let document = Html::parse_document(html);

        let records: Vec<RawDrawRecord> = document
            .select(self.selectors.card)
            .filter(|card| !card.value().classes().any(|c| c == "ads-placeholder"))
            .filter_map(|card| self.extract_section(card, jurisdiction, page))
            .collect();

        debug!(
            state = %jurisdiction.code,
            records = records.len(),
            "Extracted draw sections"
        );
        records
    }
}

/// Infer a draw time from the game name
///
/// Known games win over the generic indicators; a clock time written in the
/// name (`Pick 3 1:50 PM`) is used when no word matches.
pub fn infer_time_from_name(name: &str) -> Option<NaiveTime> {
    let lowered = name.to_lowercase();
    let known = KNOWN_GAME_TIMES
        .iter()
        .find(|(game, _)| lowered.contains(&game.to_lowercase()))
        .map(|(_, hm)| *hm);

    let indicated = || {
        TIME_INDICATORS
            .iter()
            .find(|(word, _)| name.contains(word))
            .map(|(_, hm)| *hm)
    };

    if let Some((h, m)) = known.or_else(indicated) {
        return NaiveTime::from_hms_opt(h, m, 0).map(crate::utils::round_to_five_minutes);
    }

    if name.chars().any(|c| c.is_ascii_digit()) {
        static CLOCK_RE: OnceLock<Regex> = OnceLock::new();
        let clock = CLOCK_RE.get_or_init(|| {
            Regex::new(r"(?i)(\d{1,2}[:.]\d{2}\s*[AP]M|\d{1,2}\s*[AP]M)").expect("Invalid regex pattern")
        });
        return clock.captures(name).and_then(|caps| parse_time(&caps[1]));
    }

    None
}

/// Today's date in local time, used when a latest page carries no date
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
