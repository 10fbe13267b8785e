//! Common utility functions for yen calculations.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::Yen;

/// Truncates a decimal toward negative infinity and converts it to whole yen.
///
/// Values outside the `i64` range saturate.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use quote_core::calculations::common::floor_to_yen;
///
/// assert_eq!(floor_to_yen(dec!(908.18)), 908);
/// assert_eq!(floor_to_yen(dec!(1000)), 1000);
/// assert_eq!(floor_to_yen(dec!(-0.5)), -1);
/// ```
pub fn floor_to_yen(value: Decimal) -> Yen {
    value.floor().to_i64().unwrap_or(if value.is_sign_negative() {
        Yen::MIN
    } else {
        Yen::MAX
    })
}

/// Formats an amount with comma thousands separators, e.g. `55,000`.
///
/// # Examples
///
/// ```
/// use quote_core::calculations::common::format_thousands;
///
/// assert_eq!(format_thousands(55000), "55,000");
/// assert_eq!(format_thousands(-1234567), "-1,234,567");
/// assert_eq!(format_thousands(999), "999");
/// ```
pub fn format_thousands(amount: Yen) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats an amount as `55,000円`.
pub fn format_yen(amount: Yen) -> String {
    format!("{}円", format_thousands(amount))
}
