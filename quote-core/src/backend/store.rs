use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::CustomerInfo;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Persists the last customer record entered, used to prefill the next session.
///
/// Nothing else about the wizard is persisted; losing items, attachments or
/// generation flags on restart is expected.
#[async_trait]
pub trait CustomerInfoStore: Send + Sync {
    async fn load_last(&self) -> Result<Option<CustomerInfo>, StoreError>;

    async fn save_last(
        &self,
        info: &CustomerInfo,
    ) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store; forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryCustomerStore {
    last: Mutex<Option<CustomerInfo>>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerInfoStore for MemoryCustomerStore {
    async fn load_last(&self) -> Result<Option<CustomerInfo>, StoreError> {
        let guard = self
            .last
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save_last(
        &self,
        info: &CustomerInfo,
    ) -> Result<(), StoreError> {
        let mut guard = self
            .last
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        *guard = Some(info.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self
            .last
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}
