//! Quote arithmetic
//!
//! Pure pricing rules: the marketplace cost estimate, the
//! personal-shopping service formula and the flat markup used for
//! non-StockX platforms. No I/O lives here.

use serde::{Deserialize, Serialize};

/// Share of the captured total kept before the flat service fee
pub const SERVICE_MULTIPLIER: f64 = 0.98;

/// StockX sales tax estimate
pub const TAX_RATE: f64 = 0.085;

/// StockX payment processing estimate
pub const PROCESSING_RATE: f64 = 0.085;

/// Markup applied to listings on other platforms
pub const OTHER_PLATFORM_MARKUP: f64 = 1.15;

/// Product category, derived from page text or picked by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    #[default]
    Sneakers,
    TShirt,
    Hoodie,
    Jacket,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Sneakers,
        Category::TShirt,
        Category::Hoodie,
        Category::Jacket,
    ];

    /// Flat service fee added on top of the discounted StockX total
    pub fn service_fee(self) -> f64 {
        match self {
            Category::Sneakers => 50.0,
            Category::TShirt => 20.0,
            Category::Hoodie => 30.0,
            Category::Jacket => 40.0,
        }
    }

    /// StockX shipping estimate per category
    pub fn shipping_cost(self) -> f64 {
        match self {
            Category::Sneakers | Category::Jacket => 14.95,
            Category::TShirt | Category::Hoodie => 12.95,
        }
    }

    /// Flat fee for listings on other platforms
    pub fn other_platform_fee(self) -> f64 {
        match self {
            Category::Sneakers => 50.0,
            Category::Hoodie | Category::Jacket => 30.0,
            Category::TShirt => 20.0,
        }
    }

    /// Loose operator-input parsing; anything unrecognized is treated
    /// as Sneakers (and therefore priced with the Sneakers fee).
    pub fn from_input(input: &str) -> Self {
        let lower = input.to_lowercase();
        if lower.contains("jacket") {
            Category::Jacket
        } else if lower.contains("hoodie") {
            Category::Hoodie
        } else if lower.contains("shirt") {
            Category::TShirt
        } else {
            Category::Sneakers
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Sneakers => "Sneakers",
            Category::TShirt => "T-Shirt",
            Category::Hoodie => "Hoodie",
            Category::Jacket => "Jacket",
        };
        write!(f, "{}", name)
    }
}

/// Service quote from a checkout total captured on the marketplace:
/// `total * 0.98 + fee(category)`
pub fn calculate_service_price(captured_total: f64, category: Category) -> f64 {
    captured_total * SERVICE_MULTIPLIER + category.service_fee()
}

/// Full StockX cost estimate from a listed base price
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockxQuote {
    pub base_price: f64,
    pub tax: f64,
    pub processing: f64,
    pub shipping: f64,
    pub stockx_total: f64,
    pub final_quote: f64,
}

/// Quote for a listing on a non-StockX platform
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherPlatformQuote {
    pub base_price: f64,
    pub markup_total: f64,
    pub fee: f64,
    pub final_quote: f64,
}

/// Pricing rules bundled for the callers
#[derive(Debug, Clone)]
pub struct QuoteCalculator {
    tax_rate: f64,
    processing_rate: f64,
}

impl Default for QuoteCalculator {
    fn default() -> Self {
        Self {
            tax_rate: TAX_RATE,
            processing_rate: PROCESSING_RATE,
        }
    }
}

impl QuoteCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the StockX checkout total from a listed base price and
    /// derive the service quote from it
    pub fn stockx(&self, base_price: f64, category: Category) -> StockxQuote {
        let tax = base_price * self.tax_rate;
        let processing = base_price * self.processing_rate;
        let shipping = category.shipping_cost();
        let stockx_total = base_price + tax + processing + shipping;

        StockxQuote {
            base_price,
            tax,
            processing,
            shipping,
            stockx_total,
            final_quote: calculate_service_price(stockx_total, category),
        }
    }

    /// Quote for other platforms: `base * 1.15 + fee(category)`
    pub fn other_platform(&self, base_price: f64, category: Category) -> OtherPlatformQuote {
        let markup_total = base_price * OTHER_PLATFORM_MARKUP;
        let fee = category.other_platform_fee();

        OtherPlatformQuote {
            base_price,
            markup_total,
            fee,
            final_quote: markup_total + fee,
        }
    }
}

/// Format a dollar amount with thousands separators: `$1,328.50`
pub fn format_usd(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_cents(v: f64) -> f64 {
        (v * 100.0).round() / 100.0
    }

    #[test]
    fn service_price_applies_multiplier_and_fee() {
        for category in Category::ALL {
            let total = 333.33;
            assert_eq!(
                calculate_service_price(total, category),
                total * 0.98 + category.service_fee()
            );
        }
    }

    #[test]
    fn unknown_category_input_uses_sneakers_fee() {
        let category = Category::from_input("???");
        assert_eq!(category, Category::Sneakers);
        assert_eq!(category.service_fee(), 50.0);
    }

    #[test]
    fn category_input_parsing() {
        assert_eq!(Category::from_input("t-shirt"), Category::TShirt);
        assert_eq!(Category::from_input("Hoodie pls"), Category::Hoodie);
        assert_eq!(Category::from_input("JACKET"), Category::Jacket);
        assert_eq!(Category::from_input("sneakers"), Category::Sneakers);
    }

    #[test]
    fn stockx_scenario_sneakers_180() {
        let quote = QuoteCalculator::new().stockx(180.0, Category::Sneakers);

        assert_eq!(round_cents(quote.tax), 15.30);
        assert_eq!(round_cents(quote.processing), 15.30);
        assert_eq!(quote.shipping, 14.95);
        assert_eq!(round_cents(quote.stockx_total), 225.55);
        // 225.55 * 0.98 + 50
        assert_eq!(round_cents(quote.final_quote), 271.04);
    }

    #[test]
    fn other_platform_scenario_hoodie_100() {
        let quote = QuoteCalculator::new().other_platform(100.0, Category::Hoodie);

        assert_eq!(round_cents(quote.markup_total), 115.00);
        assert_eq!(quote.fee, 30.0);
        assert_eq!(round_cents(quote.final_quote), 145.00);
    }

    #[test]
    fn other_platform_fees_differ_from_service_fees() {
        // The jacket fee differs between the two tables on purpose.
        assert_eq!(Category::Jacket.service_fee(), 40.0);
        assert_eq!(Category::Jacket.other_platform_fee(), 30.0);
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(1328.5), "$1,328.50");
        assert_eq!(format_usd(271.039), "$271.04");
        assert_eq!(format_usd(0.5), "$0.50");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
    }
}
