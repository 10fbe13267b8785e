#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quote_core::backend::{
    DocumentBackend, EstimateRequest, GeneratedDocument, RemoteError, WorkInstructionRequest,
};
use quote_core::{CatalogItem, CustomerInfo, DocumentRef};
use quote_wizard::attachments::{AttachmentManager, AttachmentLimits, CountingPreviewTracker};
use quote_wizard::{SharedStore, WizardStore};
use rust_decimal_macros::dec;
use tokio::sync::Notify;

/// Document backend double that records requests and can hold calls open.
#[derive(Default)]
pub struct MockBackend {
    pub estimate_calls: AtomicUsize,
    pub instruction_calls: AtomicUsize,
    pub estimates: Mutex<Vec<EstimateRequest>>,
    pub instructions: Mutex<Vec<WorkInstructionRequest>>,
    /// Notified each time a call reaches the backend.
    pub entered: Notify,
    failure: Option<RemoteError>,
    gate: Option<Arc<Notify>>,
}

impl MockBackend {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(error: RemoteError) -> Self {
        Self {
            failure: Some(error),
            ..Default::default()
        }
    }

    /// Every call waits for `gate` before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    async fn answer(
        &self,
        name: String,
    ) -> Result<GeneratedDocument, RemoteError> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(GeneratedDocument {
                reference: DocumentRef(name),
                content: Some(b"%PDF-1.4".to_vec()),
            }),
        }
    }
}

#[async_trait]
impl DocumentBackend for MockBackend {
    async fn generate_estimate(
        &self,
        request: EstimateRequest,
    ) -> Result<GeneratedDocument, RemoteError> {
        let n = self.estimate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.estimates.lock().unwrap().push(request);
        self.answer(format!("estimate_{n}.pdf")).await
    }

    async fn generate_work_instruction(
        &self,
        request: WorkInstructionRequest,
    ) -> Result<GeneratedDocument, RemoteError> {
        self.instruction_calls.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}.pdf", request.instruction_no);
        self.instructions.lock().unwrap().push(request);
        self.answer(name).await
    }
}

pub fn shared_store() -> (SharedStore, Arc<CountingPreviewTracker>) {
    let tracker = Arc::new(CountingPreviewTracker::new());
    let manager = AttachmentManager::new(AttachmentLimits::default(), tracker.clone());
    (SharedStore::new(WizardStore::new(dec!(0.10), manager)), tracker)
}

pub fn tanaka() -> CustomerInfo {
    CustomerInfo::new("田中太郎", "東京都千代田区1-1", "03-1234-5678")
}

pub fn sofa() -> CatalogItem {
    CatalogItem {
        id: "sofa-2".to_string(),
        name: "2人掛けソファ".to_string(),
        price: 1000,
        category: "家具".to_string(),
    }
}
