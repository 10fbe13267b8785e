//! Wire records and trait for the document-generation service.
//!
//! Both generation calls are opaque to the wizard: they either return a
//! [`GeneratedDocument`] or a [`RemoteError`]. Retrying is left to the user.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::{format_thousands, format_yen};
use crate::calculations::line_subtotal;
use crate::{CustomerInfo, DocumentRef, LineItem, WorkInstruction, Yen};

/// An attachment converted for transport. `data` is a base64 data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub id: String,
    pub name: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateCustomer {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub disposal_date: String,
}

impl From<&CustomerInfo> for EstimateCustomer {
    fn from(info: &CustomerInfo) -> Self {
        Self {
            name: info.name.clone(),
            address: info.address.clone(),
            phone: info.phone.clone(),
            email: info.email.clone().unwrap_or_default(),
            disposal_date: info.disposal_date.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub custom_price: Yen,
    pub amount: Yen,
}

impl From<&LineItem> for EstimateItem {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            custom_price: item.custom_unit_price,
            amount: line_subtotal(item),
        }
    }
}

/// Body of the estimate generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub customer: EstimateCustomer,
    pub items: Vec<EstimateItem>,
    pub images: Vec<EncodedImage>,
}

impl EstimateRequest {
    pub fn new(
        customer: &CustomerInfo,
        items: &[LineItem],
        images: Vec<EncodedImage>,
    ) -> Self {
        Self {
            customer: customer.into(),
            items: items.iter().map(EstimateItem::from).collect(),
            images,
        }
    }
}

/// Contact block printed twice on the work instruction (contractor and collector copy).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyInfo {
    pub recipient: String,
    pub name: String,
    pub address: String,
    pub person: String,
    pub tel: String,
}

impl From<&CustomerInfo> for PartyInfo {
    fn from(info: &CustomerInfo) -> Self {
        Self {
            recipient: "受付済".to_string(),
            name: info.name.clone(),
            address: info.address.clone(),
            person: info.name.clone(),
            tel: info.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub description: String,
}

/// Work execution block. Every value is preformatted text for the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDetails {
    pub work_slip: String,
    pub collection_amount: String,
    pub weight: String,
    pub manifest: String,
    pub t_point: String,
    pub tax_excluded_rate: String,
    pub recycling_ticket: String,
    pub recycling_ticket_no: bool,
    pub points: String,
}

const DONE: &str = "済";

fn done_mark(done: bool) -> String {
    if done { DONE.to_string() } else { String::new() }
}

impl From<&WorkInstruction> for WorkDetails {
    fn from(wi: &WorkInstruction) -> Self {
        let (t_point, points) = if wi.points_eligible {
            (
                format!("{}pt", format_thousands(wi.points_used)),
                format_thousands(wi.points_used),
            )
        } else {
            (String::new(), String::new())
        };

        Self {
            work_slip: done_mark(wi.work_slip_done),
            collection_amount: format_yen(wi.amount_tax_included),
            weight: done_mark(wi.weighing_done),
            manifest: done_mark(wi.manifest_done),
            t_point,
            tax_excluded_rate: format_yen(wi.amount_tax_excluded),
            recycling_ticket: done_mark(wi.recycle_ticket_done),
            recycling_ticket_no: !wi.recycle_ticket_done,
            points,
        }
    }
}

/// Body of the work-instruction generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkInstructionRequest {
    pub instruction_no: String,
    pub collection_date: String,
    pub contractor: PartyInfo,
    pub collector: PartyInfo,
    pub items: Vec<WorkItem>,
    pub memo: String,
    pub work_details: WorkDetails,
}

impl WorkInstructionRequest {
    pub fn new(
        instruction_no: String,
        customer: &CustomerInfo,
        items: &[LineItem],
        instruction: &WorkInstruction,
    ) -> Self {
        Self {
            instruction_no,
            collection_date: instruction.collection_date.clone(),
            contractor: customer.into(),
            collector: customer.into(),
            items: items
                .iter()
                .map(|item| WorkItem {
                    description: format!("{} {}点", item.name, item.quantity),
                })
                .collect(),
            memo: instruction.notes.clone().unwrap_or_default(),
            work_details: instruction.into(),
        }
    }
}

/// Builds an instruction number such as `INS-20250425-001`.
///
/// The suffix is the millisecond component of `issued_at`, which keeps
/// numbers issued on the same day apart without shared counters.
pub fn instruction_number<Tz: TimeZone>(issued_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "INS-{}-{:03}",
        issued_at.format("%Y%m%d"),
        issued_at.timestamp_subsec_millis() % 1000
    )
}

/// Result of a successful generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub reference: DocumentRef,
    /// PDF bytes when the service returns the document inline.
    pub content: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The service refused the request as invalid.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service failed while handling a valid request.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn generate_estimate(
        &self,
        request: EstimateRequest,
    ) -> Result<GeneratedDocument, RemoteError>;

    async fn generate_work_instruction(
        &self,
        request: WorkInstructionRequest,
    ) -> Result<GeneratedDocument, RemoteError>;
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::CatalogItem;

    fn customer() -> CustomerInfo {
        CustomerInfo::new("田中", "東京都", "03-0000-0000")
    }

    fn fridge(quantity: u32) -> LineItem {
        let mut item = LineItem::from_catalog(&CatalogItem {
            id: "3-1".to_string(),
            name: "冷蔵庫".to_string(),
            price: 10000,
            category: "家電".to_string(),
        });
        item.quantity = quantity;
        item
    }

    #[test]
    fn estimate_request_carries_amount_per_line() {
        let request = EstimateRequest::new(&customer(), &[fridge(2)], Vec::new());

        assert_eq!(request.items[0].amount, 20000);
        assert_eq!(request.items[0].custom_price, 10000);
        assert_eq!(request.customer.email, "");
    }

    #[test]
    fn estimate_request_serializes_camel_case() {
        let request = EstimateRequest::new(&customer(), &[fridge(1)], Vec::new());

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["items"][0]["customPrice"], 10000);
        assert_eq!(json["customer"]["disposalDate"], "");
    }

    #[test]
    fn work_details_mark_completed_steps() {
        let mut wi = WorkInstruction::from_defaults(&customer(), 55000, dec!(0.10));
        wi.work_slip_done = true;
        wi.points_eligible = true;
        wi.points_used = 1100;

        let details = WorkDetails::from(&wi);

        assert_eq!(details.work_slip, "済");
        assert_eq!(details.weight, "");
        assert_eq!(details.collection_amount, "55,000円");
        assert_eq!(details.tax_excluded_rate, "50,000円");
        assert_eq!(details.t_point, "1,100pt");
        assert!(details.recycling_ticket_no);
    }

    #[test]
    fn work_instruction_request_describes_items() {
        let mut wi = WorkInstruction::from_defaults(&customer(), 20000, dec!(0.10));
        wi.notes = Some("駐車場は建物裏側".to_string());

        let request = WorkInstructionRequest::new(
            "INS-20250425-001".to_string(),
            &customer(),
            &[fridge(2)],
            &wi,
        );

        assert_eq!(request.items[0].description, "冷蔵庫 2点");
        assert_eq!(request.memo, "駐車場は建物裏側");
        assert_eq!(request.contractor, request.collector);
        assert_eq!(request.contractor.tel, "03-0000-0000");
    }

    #[test]
    fn instruction_number_uses_date_and_millis() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let issued = jst
            .with_ymd_and_hms(2025, 4, 25, 10, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(7);

        assert_eq!(instruction_number(&issued), "INS-20250425-007");
    }

    #[test]
    fn only_rejections_report_as_rejection() {
        let rejected = RemoteError::Rejected {
            status: 400,
            message: "bad".to_string(),
        };

        assert!(rejected.is_rejection());
        assert!(!RemoteError::Network("timeout".to_string()).is_rejection());
    }
}
