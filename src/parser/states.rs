//! Jurisdiction menu parsing
//!
//! The site lists every jurisdiction in a `<select>` menu whose option
//! values are the jurisdiction paths (`/ny`, `/ca`, ...).

use scraper::Html;

use super::selectors::menu_option;
use crate::utils::normalize_whitespace;

/// A jurisdiction advertised by the site menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Uppercase code derived from the option value
    pub code: String,
    pub name: String,
}

/// Parse the jurisdiction menu of a site page
///
/// Options without a path value (placeholders such as "Select State") are
/// skipped. Duplicate codes keep their first occurrence.
pub fn parse_jurisdiction_menu(html: &str) -> Vec<MenuEntry> {
    let document = Html::parse_document(html);
    let mut entries: Vec<MenuEntry> = Vec::new();

    for option in document.select(menu_option()) {
        let Some(value) = option.value().attr("value") else {
            continue;
        };
        let code = value.trim().trim_matches('/').to_uppercase();
        if code.is_empty() || code.contains('/') {
            continue;
        }

        let name = normalize_whitespace(&option.text().collect::<String>());
        if name.is_empty() || entries.iter().any(|e| e.code == code) {
            continue;
        }

        entries.push(MenuEntry { code, name });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENU: &str = r#"
        <html><body>
        <form name="menuform">
          <select name="menu2">
            <option value="">Select State</option>
            <option value="/ny">New York</option>
            <option value="/ca">  California </option>
            <option value="/ny">New York</option>
          </select>
        </form>
        <select name="other"><option value="/tx">Texas</option></select>
        </body></html>
    "#;

    #[test]
    fn test_parse_menu() {
        let entries = parse_jurisdiction_menu(MENU);
        assert_eq!(
            entries,
            vec![
                MenuEntry {
                    code: "NY".into(),
                    name: "New York".into()
                },
                MenuEntry {
                    code: "CA".into(),
                    name: "California".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_menu_missing() {
        assert!(parse_jurisdiction_menu("<html><body><p>maintenance</p></body></html>").is_empty());
    }
}
