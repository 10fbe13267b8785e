use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CustomerInfo, Yen};
use crate::calculations::money::tax_excluded_from_included;

/// Field values of the work-order screen.
///
/// `amount_tax_excluded` follows `amount_tax_included` one way: every change
/// to the tax-inclusive amount re-derives it. It may only diverge through
/// [`WorkInstructionField::AmountTaxExcludedOverride`], and the next change to
/// the tax-inclusive amount discards that override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkInstruction {
    pub collection_date: String,
    pub notes: Option<String>,
    pub work_slip_done: bool,
    pub weighing_done: bool,
    pub manifest_done: bool,
    pub recycle_ticket_done: bool,
    pub amount_tax_included: Yen,
    pub amount_tax_excluded: Yen,
    pub tax_excluded_override: bool,
    pub points_eligible: bool,
    pub points_used: i64,
    /// Set once the work-instruction document has been generated.
    pub locked: bool,
}

impl WorkInstruction {
    /// Seeds the record the first time the work-order screen mounts.
    pub fn from_defaults(
        customer: &CustomerInfo,
        total: Yen,
        tax_rate: Decimal,
    ) -> Self {
        Self {
            collection_date: customer.disposal_date.clone().unwrap_or_default(),
            notes: None,
            work_slip_done: false,
            weighing_done: false,
            manifest_done: false,
            recycle_ticket_done: false,
            amount_tax_included: total,
            amount_tax_excluded: tax_excluded_from_included(total, tax_rate),
            tax_excluded_override: false,
            points_eligible: false,
            points_used: 0,
            locked: false,
        }
    }

    pub fn apply(
        &mut self,
        field: WorkInstructionField,
        tax_rate: Decimal,
    ) {
        match field {
            WorkInstructionField::CollectionDate(date) => self.collection_date = date,
            WorkInstructionField::Notes(notes) => {
                self.notes = notes.filter(|n| !n.trim().is_empty());
            }
            WorkInstructionField::WorkSlipDone(done) => self.work_slip_done = done,
            WorkInstructionField::WeighingDone(done) => self.weighing_done = done,
            WorkInstructionField::ManifestDone(done) => self.manifest_done = done,
            WorkInstructionField::RecycleTicketDone(done) => self.recycle_ticket_done = done,
            WorkInstructionField::AmountTaxIncluded(amount) => {
                self.amount_tax_included = amount;
                self.amount_tax_excluded = tax_excluded_from_included(amount, tax_rate);
                self.tax_excluded_override = false;
            }
            WorkInstructionField::AmountTaxExcludedOverride(amount) => {
                self.amount_tax_excluded = amount;
                self.tax_excluded_override = true;
            }
            WorkInstructionField::ClearTaxExcludedOverride => {
                self.amount_tax_excluded =
                    tax_excluded_from_included(self.amount_tax_included, tax_rate);
                self.tax_excluded_override = false;
            }
            WorkInstructionField::PointsEligible(eligible) => self.points_eligible = eligible,
            WorkInstructionField::PointsUsed(points) => self.points_used = points,
        }
    }
}

/// A single edit on the work-order screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum WorkInstructionField {
    CollectionDate(String),
    Notes(Option<String>),
    WorkSlipDone(bool),
    WeighingDone(bool),
    ManifestDone(bool),
    RecycleTicketDone(bool),
    AmountTaxIncluded(Yen),
    AmountTaxExcludedOverride(Yen),
    ClearTaxExcludedOverride,
    PointsEligible(bool),
    PointsUsed(i64),
}
