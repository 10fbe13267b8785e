//! Line subtotal, wizard total and consumption-tax conversions.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use quote_core::calculations::{EstimateTotals, tax_excluded_from_included};
//! use quote_core::{CatalogItem, LineItem};
//!
//! let mut line = LineItem::from_catalog(&CatalogItem {
//!     id: "a".to_string(),
//!     name: "冷蔵庫".to_string(),
//!     price: 1000,
//!     category: "家電".to_string(),
//! });
//! line.quantity = 2;
//!
//! let totals = EstimateTotals::compute(&[line], dec!(0.10));
//! assert_eq!(totals.subtotal, 2000);
//! assert_eq!(totals.tax, 200);
//! assert_eq!(totals.total, 2200);
//!
//! assert_eq!(tax_excluded_from_included(1100, dec!(0.10)), 1000);
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::floor_to_yen;
use crate::{LineItem, Yen};

/// Japanese consumption tax, 10%.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// `custom_unit_price * quantity`.
pub fn line_subtotal(item: &LineItem) -> Yen {
    item.custom_unit_price
        .saturating_mul(Yen::from(item.quantity))
}

/// Sum of all line subtotals. An empty list totals zero.
pub fn wizard_total(items: &[LineItem]) -> Yen {
    items
        .iter()
        .map(line_subtotal)
        .fold(0, Yen::saturating_add)
}

/// `floor(amount / (1 + rate))`.
///
/// A rate of -100% or lower has no meaningful inverse; the amount is returned
/// unchanged in that case so the function stays total.
pub fn tax_excluded_from_included(
    amount: Yen,
    rate: Decimal,
) -> Yen {
    let divisor = Decimal::ONE + rate;
    if divisor <= Decimal::ZERO {
        return amount;
    }
    Decimal::from(amount)
        .checked_div(divisor)
        .map(floor_to_yen)
        .unwrap_or(amount)
}

/// Consumption tax on a tax-exclusive subtotal, `floor(subtotal * rate)`.
pub fn tax_on(
    subtotal: Yen,
    rate: Decimal,
) -> Yen {
    Decimal::from(subtotal)
        .checked_mul(rate)
        .map(floor_to_yen)
        .unwrap_or(Yen::MAX)
}

/// Summary block printed on the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateTotals {
    pub subtotal: Yen,
    pub tax: Yen,
    pub total: Yen,
}

impl EstimateTotals {
    pub fn compute(
        items: &[LineItem],
        rate: Decimal,
    ) -> Self {
        let subtotal = wizard_total(items);
        let tax = tax_on(subtotal, rate);
        Self {
            subtotal,
            tax,
            total: subtotal.saturating_add(tax),
        }
    }
}
