//! Monetary calculations for quotes and work instructions.
//!
//! Every amount is whole yen. Tax rates are exact decimals so that
//! tax-inclusive/tax-exclusive conversion floors the true quotient.

pub mod common;
pub mod money;

pub use money::{
    DEFAULT_TAX_RATE, EstimateTotals, line_subtotal, tax_excluded_from_included, tax_on,
    wizard_total,
};
