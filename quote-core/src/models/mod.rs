mod catalog;
mod customer_info;
mod document;
mod line_item;
mod work_instruction;

pub use catalog::{CatalogItem, Category};
pub use customer_info::{CustomerInfo, CustomerInfoPatch};
pub use document::{DocumentRef, GeneratedDocuments};
pub use line_item::{CUSTOM_CATEGORY, LineItem, LineItemPatch};
pub use work_instruction::{WorkInstruction, WorkInstructionField};

/// Monetary amounts are whole yen.
pub type Yen = i64;
