//! Boundaries to the external collaborators: item catalog, document
//! generation service and the customer-info prefill store.

pub mod catalog;
pub mod document;
pub mod factory;
pub mod store;

pub use catalog::{
    CatalogError, CatalogLoad, CatalogOrigin, CatalogSource, StaticCatalog,
    load_catalog_with_fallback,
};
pub use document::{
    DocumentBackend, EncodedImage, EstimateCustomer, EstimateItem, EstimateRequest,
    GeneratedDocument, PartyInfo, RemoteError, WorkDetails, WorkInstructionRequest, WorkItem,
    instruction_number,
};
pub use factory::{MemoryStoreFactory, StoreConfig, StoreFactory, StoreRegistry};
pub use store::{CustomerInfoStore, MemoryCustomerStore, StoreError};
