//! Product page scanning
//!
//! Enumerates the purchasable size variants of a product page and
//! classifies the product into a category from its text. Enumeration
//! order follows the DOM and is the only stable handle a later
//! selection has, so it is preserved as-is.

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::browser::{BrowserError, BrowserSession};
use crate::pricing::Category;

/// One purchasable size variant as shown by the marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeOption {
    /// Ordinal position in the enumerated menu (stable only within the
    /// scan that produced it)
    pub index: usize,
    /// Unparsed label, e.g. "US M 8.5 $1,328"
    pub text: String,
}

/// Opens the size-selection control: the pdp size-selector button by id
/// prefix, falling back to any visible element labelled "Size:".
const OPEN_SIZE_MENU_JS: &str = r#"
    (function() {
        let control = document.querySelector('button[id^="menu-button-pdp-size-selector"]');
        if (!control || control.offsetParent === null) {
            control = Array.from(document.querySelectorAll('button, div, span'))
                .find(el => (el.innerText || '').includes('Size:') && el.offsetParent !== null);
        }
        if (!control) return false;
        control.click();
        return true;
    })()
"#;

const ENUMERATE_SIZES_JS: &str = r#"
    (function() {
        const items = document.querySelectorAll('[role="menuitemradio"], [role="menuitem"]');
        return Array.from(items).map(el => (el.innerText || '').replace(/\n/g, ' ').trim());
    })()
"#;

const COUNT_SIZES_JS: &str = r#"
    document.querySelectorAll('[role="menuitemradio"], [role="menuitem"]').length
"#;

/// Open the size menu. Returns false when the page has no size control
/// at all (one-size or out-of-stock item).
pub async fn open_size_menu(session: &BrowserSession) -> Result<bool, BrowserError> {
    let opened = session
        .execute_js_with_timeout(OPEN_SIZE_MENU_JS, 10)
        .await?
        .as_bool()
        .unwrap_or(false);

    if opened {
        // Give the menu a moment to render its entries
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
    Ok(opened)
}

/// Enumerate the currently open size menu in DOM order
pub async fn enumerate_size_options(
    session: &BrowserSession,
) -> Result<Vec<SizeOption>, BrowserError> {
    let value = session
        .execute_js_with_timeout(ENUMERATE_SIZES_JS, 10)
        .await?;

    let labels = value.as_array().cloned().unwrap_or_default();
    let options: Vec<SizeOption> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| SizeOption {
            index,
            text: label.as_str().unwrap_or_default().to_string(),
        })
        .collect();

    debug!("Enumerated {} size options", options.len());
    Ok(options)
}

/// Result of clicking one entry of the size menu
#[derive(Debug, Clone)]
pub struct SelectOutcome {
    /// Whether the entry was actually clicked
    pub clicked: bool,
    /// How many entries the live menu had at click time
    pub available: usize,
    /// Label of the clicked entry
    pub text: String,
}

/// Click the size-menu entry at `index`, re-opening the menu if it is
/// no longer showing. The live menu is re-derived and bounds-checked
/// before the click, so a stale index from an older scan is rejected
/// instead of hitting an arbitrary element.
pub async fn select_size_option(
    session: &BrowserSession,
    index: usize,
) -> Result<SelectOutcome, BrowserError> {
    let count = session
        .execute_js_with_timeout(COUNT_SIZES_JS, 10)
        .await?
        .as_u64()
        .unwrap_or(0);

    if count == 0 {
        trace!("Size menu closed; re-opening");
        open_size_menu(session).await?;
    }

    let script = format!(
        r#"
        (function() {{
            const items = document.querySelectorAll('[role="menuitemradio"], [role="menuitem"]');
            if ({index} >= items.length) {{
                return {{ clicked: false, available: items.length, text: '' }};
            }}
            const el = items[{index}];
            const text = (el.innerText || '').replace(/\n/g, ' ').trim();
            el.click();
            return {{ clicked: true, available: items.length, text }};
        }})()
        "#,
        index = index
    );

    let value = session.execute_js_with_timeout(&script, 10).await?;

    let outcome = SelectOutcome {
        clicked: value
            .get("clicked")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        available: value
            .get("available")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        text: value
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    };

    if outcome.clicked {
        info!("Selected size entry {}: {}", index, outcome.text);
    }
    Ok(outcome)
}

/// One category-classification rule: fires when any of `any` is present
/// and none of `none` is.
pub struct CategoryRule {
    pub any: &'static [&'static str],
    pub none: &'static [&'static str],
    pub category: Category,
}

/// Ordered most-specific-first; the first matching rule wins. The
/// `none` guard on the shirt rule exists because "shirt" is a substring
/// of "sweatshirt" - the hoodie rule fires first today, but the guard
/// keeps a reordering from silently misclassifying sweatshirts.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        any: &["jacket", "coat", "parka"],
        none: &[],
        category: Category::Jacket,
    },
    CategoryRule {
        any: &["hoodie", "hooded", "sweatshirt", "pullover"],
        none: &[],
        category: Category::Hoodie,
    },
    CategoryRule {
        any: &["t-shirt", "tee", "shirt", "top"],
        none: &["sweatshirt"],
        category: Category::TShirt,
    },
];

/// Classify a lower-cased-or-not text blob into a category.
/// Unmatched text defaults to Sneakers.
pub fn classify_listing_text(text: &str) -> Category {
    let haystack = text.to_lowercase();

    for rule in CATEGORY_RULES {
        let hit = rule.any.iter().any(|needle| haystack.contains(needle));
        let vetoed = rule.none.iter().any(|needle| haystack.contains(needle));
        if hit && !vetoed {
            return rule.category;
        }
    }

    Category::Sneakers
}

/// Gathers breadcrumb/title/heading text; missing pieces contribute
/// empty strings and per-field errors are swallowed in the page.
const GATHER_LISTING_TEXT_JS: &str = r#"
    (function() {
        let breadcrumbs = '';
        try {
            const nav = document.querySelector('nav[aria-label="Breadcrumb"]')
                || document.querySelector('nav[aria-label="breadcrumb"]')
                || document.querySelector('.chakra-breadcrumb');
            if (nav) breadcrumbs = nav.innerText || '';
        } catch (e) {}

        let heading = '';
        try {
            const h1 = document.querySelector('h1');
            if (h1) heading = h1.innerText || '';
        } catch (e) {}

        return breadcrumbs + ' ' + (document.title || '') + ' ' + heading;
    })()
"#;

/// Detect the product category from the current page. Extraction
/// failures fall back to the Sneakers default.
pub async fn detect_category(session: &BrowserSession) -> Category {
    match session
        .execute_js_with_timeout(GATHER_LISTING_TEXT_JS, 10)
        .await
    {
        Ok(value) => {
            let blob = value.as_str().unwrap_or_default();
            let category = classify_listing_text(blob);
            debug!("Detected category {} from listing text", category);
            category
        }
        Err(e) => {
            debug!("Category detection failed, defaulting to Sneakers: {}", e);
            Category::Sneakers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jacket_terms_win_first() {
        assert_eq!(classify_listing_text("Canada Goose Parka"), Category::Jacket);
        assert_eq!(
            classify_listing_text("mens wool coat with hood"),
            Category::Jacket
        );
    }

    #[test]
    fn hoodie_beats_shirt_when_both_present() {
        // Order sensitivity: rule 2 must win over rule 3.
        assert_eq!(
            classify_listing_text("essentials hoodie shirt combo"),
            Category::Hoodie
        );
    }

    #[test]
    fn sweatshirt_guard_blocks_shirt_rule() {
        // "shirt" is a substring of "sweatshirt"; even if the hoodie
        // rule were reordered away, this must never classify T-Shirt.
        assert_eq!(
            classify_listing_text("crewneck sweatshirt top"),
            Category::Hoodie
        );
        assert_ne!(
            classify_listing_text("crewneck sweatshirt top"),
            Category::TShirt
        );
    }

    #[test]
    fn plain_tee_is_tshirt() {
        assert_eq!(
            classify_listing_text("Supreme Box Logo Tee White"),
            Category::TShirt
        );
    }

    #[test]
    fn unmatched_text_defaults_to_sneakers() {
        assert_eq!(
            classify_listing_text("Jordan 1 Retro High OG"),
            Category::Sneakers
        );
        assert_eq!(classify_listing_text(""), Category::Sneakers);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_listing_text("ZIP HOODIE"), Category::Hoodie);
    }
}
