pub mod backend;
pub mod calculations;
pub mod models;
pub mod validation;

pub use backend::{
    CatalogError, CatalogSource, CustomerInfoStore, DocumentBackend, RemoteError, StoreError,
};
pub use models::*;
