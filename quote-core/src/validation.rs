//! Pure validation passes over wizard records.
//!
//! Every function returns a structured result and never panics. Messages
//! are the user-facing strings shown next to each field.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::{CustomerInfo, WorkInstruction, Yen};

/// Required customer fields, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomerField {
    Name,
    Address,
    Phone,
}

impl CustomerField {
    pub const ALL: [CustomerField; 3] = [Self::Name, Self::Address, Self::Phone];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Address => "address",
            Self::Phone => "phone",
        }
    }

    pub fn required_message(&self) -> &'static str {
        match self {
            Self::Name => "顧客名は必須です",
            Self::Address => "住所は必須です",
            Self::Phone => "電話番号は必須です",
        }
    }

    fn value<'a>(
        &self,
        info: &'a CustomerInfo,
    ) -> &'a str {
        match self {
            Self::Name => &info.name,
            Self::Address => &info.address,
            Self::Phone => &info.phone,
        }
    }
}

impl fmt::Display for CustomerField {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(
        field: &'static str,
        message: &str,
    ) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfoValidation {
    pub valid: bool,
    pub missing_fields: Vec<CustomerField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordValidation {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl RecordValidation {
    fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Reported when a wizard transition guard fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing customer fields: {}", join_fields(.missing_fields))]
    CustomerInfo { missing_fields: Vec<CustomerField> },

    #[error("missing customer fields: {}; no items selected", join_fields(.missing_fields))]
    CustomerInfoAndItems { missing_fields: Vec<CustomerField> },

    #[error("no items selected")]
    NoItems,

    #[error("invalid fields: {}", join_errors(.0))]
    Fields(Vec<FieldError>),
}

impl ValidationError {
    /// Customer fields the UI should highlight, in declaration order.
    pub fn missing_fields(&self) -> &[CustomerField] {
        match self {
            Self::CustomerInfo { missing_fields } | Self::CustomerInfoAndItems { missing_fields } => {
                missing_fields
            }
            Self::NoItems | Self::Fields(_) => &[],
        }
    }

    pub fn lacks_items(&self) -> bool {
        matches!(self, Self::NoItems | Self::CustomerInfoAndItems { .. })
    }
}

fn join_fields(fields: &[CustomerField]) -> String {
    fields
        .iter()
        .map(CustomerField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn validate_customer_info(info: &CustomerInfo) -> CustomerInfoValidation {
    let missing_fields: Vec<_> = CustomerField::ALL
        .into_iter()
        .filter(|field| field.value(info).trim().is_empty())
        .collect();

    CustomerInfoValidation {
        valid: missing_fields.is_empty(),
        missing_fields,
    }
}

pub fn validate_custom_item(
    name: &str,
    price: Yen,
) -> RecordValidation {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "アイテム名は必須です"));
    }
    if price < 0 {
        errors.push(FieldError::new("price", "価格は0以上である必要があります"));
    }

    RecordValidation::from_errors(errors)
}

pub fn validate_work_instruction(record: &WorkInstruction) -> RecordValidation {
    let mut errors = Vec::new();

    if record.collection_date.trim().is_empty() {
        errors.push(FieldError::new("collectionDate", "収集日は必須です"));
    }
    if record.amount_tax_included < 0 {
        errors.push(FieldError::new(
            "amountTaxIncluded",
            "集金額（税込）は0以上である必要があります",
        ));
    }
    if record.amount_tax_excluded < 0 {
        errors.push(FieldError::new(
            "amountTaxExcluded",
            "集金額（税抜）は0以上である必要があります",
        ));
    }
    if record.points_used < 0 {
        errors.push(FieldError::new(
            "pointsUsed",
            "Vポイント使用数は0以上である必要があります",
        ));
    }

    RecordValidation::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    // =========================================================================
    // validate_customer_info tests
    // =========================================================================

    #[test]
    fn complete_customer_info_is_valid() {
        let result = validate_customer_info(&CustomerInfo::new("田中", "東京都", "03-0000-0000"));

        assert!(result.valid);
        assert!(result.missing_fields.is_empty());
    }

    #[test]
    fn missing_fields_follow_declaration_order() {
        let result = validate_customer_info(&CustomerInfo::default());

        assert!(!result.valid);
        assert_eq!(
            result.missing_fields,
            vec![CustomerField::Name, CustomerField::Address, CustomerField::Phone]
        );
    }

    #[test]
    fn whitespace_only_counts_as_missing() {
        let result = validate_customer_info(&CustomerInfo::new("田中", "   ", "03"));

        assert_eq!(result.missing_fields, vec![CustomerField::Address]);
    }

    #[test]
    fn optional_fields_are_not_required() {
        let info = CustomerInfo {
            email: None,
            disposal_date: None,
            ..CustomerInfo::new("a", "b", "c")
        };

        assert!(validate_customer_info(&info).valid);
    }

    // =========================================================================
    // validate_custom_item tests
    // =========================================================================

    #[test]
    fn custom_item_requires_name() {
        let result = validate_custom_item("", 100);

        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "name");
    }

    #[test]
    fn custom_item_rejects_negative_price() {
        let result = validate_custom_item("ソファ", -1);

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "price");
    }

    #[test]
    fn custom_item_accepts_zero_price() {
        assert!(validate_custom_item("ソファ", 0).valid);
    }

    #[test]
    fn custom_item_reports_every_failure() {
        let result = validate_custom_item(" ", -5);

        let fields: Vec<_> = result.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "price"]);
    }

    // =========================================================================
    // validate_work_instruction tests
    // =========================================================================

    fn instruction() -> WorkInstruction {
        let customer = CustomerInfo {
            disposal_date: Some("2025-05-01".to_string()),
            ..CustomerInfo::new("田中", "東京都", "03")
        };
        WorkInstruction::from_defaults(&customer, 1100, dec!(0.10))
    }

    #[test]
    fn seeded_work_instruction_is_valid() {
        assert!(validate_work_instruction(&instruction()).valid);
    }

    #[test]
    fn work_instruction_requires_collection_date() {
        let mut wi = instruction();
        wi.collection_date.clear();

        let result = validate_work_instruction(&wi);

        assert_eq!(result.errors[0].field, "collectionDate");
    }

    #[test]
    fn work_instruction_rejects_negative_amounts_and_points() {
        let mut wi = instruction();
        wi.amount_tax_included = -1;
        wi.amount_tax_excluded = -1;
        wi.points_used = -10;

        let fields: Vec<_> = validate_work_instruction(&wi)
            .errors
            .into_iter()
            .map(|e| e.field)
            .collect();

        assert_eq!(
            fields,
            vec!["amountTaxIncluded", "amountTaxExcluded", "pointsUsed"]
        );
    }

    // =========================================================================
    // ValidationError tests
    // =========================================================================

    #[test]
    fn validation_error_exposes_missing_fields() {
        let err = ValidationError::CustomerInfoAndItems {
            missing_fields: vec![CustomerField::Phone],
        };

        assert_eq!(err.missing_fields(), &[CustomerField::Phone]);
        assert!(err.lacks_items());
        assert_eq!(
            err.to_string(),
            "missing customer fields: phone; no items selected"
        );
    }
}
