//! CSV loader for disposal orders.
//!
//! ## CSV Format
//!
//! Headers are matched by name, so column order does not matter.
//!
//! | Column         | Required | Notes                                                  |
//! |----------------|----------|--------------------------------------------------------|
//! | `id`           | no       | Catalog item id. Empty marks a hand-entered item       |
//! | `name`         | yes      |                                                        |
//! | `price`        | yes      | Whole yen; `1,200`, `¥1200` and `1200円` are accepted  |
//! | `quantity`     | no       | Positive integer, defaults to 1                        |
//! | `category`     | no       | Ignored for hand-entered items                         |
//! | `custom_price` | no       | Negotiated unit price, defaults to `price`             |
//!
//! ### Example
//!
//! ```csv
//! id,name,price,quantity,category
//! sofa-3,3人掛けソファ,5000,1,家具
//! ,古い自転車,800,2,
//! ```

use std::path::Path;

use quote_core::{CatalogItem, LineItem, Yen};
use serde::Deserialize;

use crate::utils::parse_yen;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    name: String,
    price: String,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    custom_price: Option<String>,
}

/// Errors that can occur while loading an order file.
#[derive(Debug, thiserror::Error)]
pub enum CsvLoadError {
    #[error("CSV parse error: {0}")]
    Parse(#[from] csv::Error),

    #[error("cannot read order file: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing name on row {row}")]
    MissingName { row: usize },

    #[error("missing price on row {row}")]
    MissingPrice { row: usize },

    #[error("invalid {column} '{value}' on row {row}")]
    InvalidNumber {
        column: &'static str,
        value: String,
        row: usize,
    },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_amount(
    column: &'static str,
    value: &str,
    row: usize,
) -> Result<Yen, CsvLoadError> {
    parse_yen(value)
        .ok()
        .filter(|amount| *amount >= 0)
        .ok_or_else(|| CsvLoadError::InvalidNumber {
            column,
            value: value.to_string(),
            row,
        })
}

/// `row_number` is 1-based, not counting the header.
fn convert_row(
    row: CsvRow,
    row_number: usize,
) -> Result<LineItem, CsvLoadError> {
    let name = row.name.trim().to_string();
    if name.is_empty() {
        return Err(CsvLoadError::MissingName { row: row_number });
    }
    if row.price.trim().is_empty() {
        return Err(CsvLoadError::MissingPrice { row: row_number });
    }
    let price = parse_amount("price", &row.price, row_number)?;

    let quantity = match non_empty(row.quantity) {
        None => 1,
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|q| *q > 0)
            .ok_or(CsvLoadError::InvalidNumber {
                column: "quantity",
                value: raw.clone(),
                row: row_number,
            })?,
    };

    let mut line = match non_empty(row.id) {
        Some(id) => LineItem::from_catalog(&CatalogItem {
            id: id.trim().to_string(),
            name,
            price,
            category: non_empty(row.category).unwrap_or_default(),
        }),
        None => LineItem::custom(name, price),
    };

    line.quantity = quantity;
    if let Some(raw) = non_empty(row.custom_price) {
        line.custom_unit_price = parse_amount("custom_price", &raw, row_number)?;
    }
    Ok(line)
}

/// Parses order CSV text into line items, in file order.
///
/// Rows with the same `id` are kept separate here; merging happens when the
/// items are added to the wizard.
pub fn load_from_str(input: &str) -> Result<Vec<LineItem>, CsvLoadError> {
    load_from_reader(input.as_bytes())
}

pub fn load_from_reader<R: std::io::Read>(reader: R) -> Result<Vec<LineItem>, CsvLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader);

    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(idx, result)| convert_row(result?, idx + 1))
        .collect()
}

pub fn load_from_file(path: &Path) -> Result<Vec<LineItem>, CsvLoadError> {
    let file = std::fs::File::open(path)?;
    load_from_reader(file)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
