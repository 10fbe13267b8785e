use quote_core::Yen;
use thiserror::Error;

/// Error returned when a string cannot be read as a yen amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid yen amount '{input}'")]
pub struct ParseYenError {
    input: String,
}

/// Strips currency marks and thousands separators: `"¥1,200"`, `"1,200円"`
/// and `" 1200 "` all become `"1200"`.
fn normalize_yen_input(s: &str) -> String {
    s.trim()
        .trim_start_matches(['¥', '￥'])
        .trim_end_matches('円')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect()
}

/// Parses a whole-yen amount. The result may be negative; range checks
/// belong to the validation rules.
pub fn parse_yen(s: &str) -> Result<Yen, ParseYenError> {
    normalize_yen_input(s).parse().map_err(|e| {
        tracing::error!(input = %s, "invalid yen amount: {}", e);
        ParseYenError {
            input: s.to_string(),
        }
    })
}

/// Like [`parse_yen`] but empty input yields `None`.
pub fn parse_optional_yen(s: &str) -> Result<Option<Yen>, ParseYenError> {
    if normalize_yen_input(s).is_empty() {
        Ok(None)
    } else {
        parse_yen(s).map(Some)
    }
}

/// Formats an optional text value for display, using "—" when absent.
pub fn opt_display(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("—")
}
