//! CSS selectors for lotterycorner results pages
//!
//! Selectors are compiled once and shared by every extractor instance.

use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    // Draw section layout
    static ref CARD: Selector = parse_selector!("div.card");
    static ref CARD_HEADER: Selector = parse_selector!("div.card-header");
    static ref CARD_BODY: Selector = parse_selector!("div.card-body");
    static ref GAME_NAME: Selector = parse_selector!("h3");
    static ref LOGO: Selector = parse_selector!("img[src]");

    // Draw date and time
    static ref TIMER: Selector = parse_selector!("div.timer[data-enddate]");
    static ref AMOUNT_TITLE: Selector = parse_selector!("div.amount__title");

    // Numbers
    static ref NUMBER: Selector = parse_selector!("div.c-lottery-numbers div.number");

    // Jackpots and next draw
    static ref AMOUNTS: Selector = parse_selector!("div.amounts");
    static ref ITEM: Selector = parse_selector!("div.item");
    static ref HIGHLIGHTED_ITEM: Selector = parse_selector!("div.item--highlighted");
    static ref NEXT_DATE_ITEM: Selector = parse_selector!("div.next-date-div div.item");

    // Jurisdiction menu
    static ref MENU_OPTION: Selector =
        parse_selector!("form[name=menuform] select[name=menu2] option");
}

/// Selectors for one draw section
pub struct DrawSelectors {
    pub card: &'static Selector,
    pub header: &'static Selector,
    pub body: &'static Selector,
    pub name: &'static Selector,
    pub logo: &'static Selector,
    pub timer: &'static Selector,
    pub amount_title: &'static Selector,
    pub number: &'static Selector,
    pub amounts: &'static Selector,
    pub item: &'static Selector,
    pub highlighted_item: &'static Selector,
    pub next_date_item: &'static Selector,
}

impl DrawSelectors {
    pub fn new() -> Self {
        Self {
            card: &CARD,
            header: &CARD_HEADER,
            body: &CARD_BODY,
            name: &GAME_NAME,
            logo: &LOGO,
            timer: &TIMER,
            amount_title: &AMOUNT_TITLE,
            number: &NUMBER,
            amounts: &AMOUNTS,
            item: &ITEM,
            highlighted_item: &HIGHLIGHTED_ITEM,
            next_date_item: &NEXT_DATE_ITEM,
        }
    }
}

impl Default for DrawSelectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Option entries of the site's jurisdiction menu
pub fn menu_option() -> &'static Selector {
    &MENU_OPTION
}
