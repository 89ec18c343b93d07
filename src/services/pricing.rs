//! Order totals. All arithmetic is exact decimal; nothing here touches the
//! database, which keeps the rules trivially testable.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Storefront pricing knobs. Defaults: free shipping strictly above 150,
/// otherwise a flat 15 fee, and 5% tax on the subtotal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingRules {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            free_shipping_threshold: dec!(150),
            flat_shipping_fee: dec!(15),
            tax_rate: dec!(0.05),
        }
    }
}

/// A priced line, independent of where it came from (cart or buy-now).
#[derive(Debug, Clone, Copy)]
pub struct LineItem {
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Full price breakdown for a set of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Quote {
    pub fn for_lines(lines: &[LineItem], rules: &PricingRules) -> Quote {
        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();

        // Free shipping only strictly above the threshold: a subtotal of
        // exactly 150 still pays the flat fee.
        let shipping = if subtotal > rules.free_shipping_threshold {
            Decimal::ZERO
        } else {
            rules.flat_shipping_fee
        };

        let tax = subtotal * rules.tax_rate;
        let total = subtotal + shipping + tax;

        Quote {
            subtotal,
            shipping,
            tax,
            total,
        }
    }

    /// Total in minor currency units (cents), rounded half away from zero.
    /// Returns `None` only if the amount cannot fit an i64, which no
    /// realistic order reaches.
    pub fn total_minor_units(&self) -> Option<i64> {
        (self.total * dec!(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}
