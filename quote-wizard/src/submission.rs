//! Estimate and work-instruction generation.
//!
//! Each workflow snapshots the store, performs its remote call without
//! holding the store lock, and writes the result back only if the session
//! is still the one the call started in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use quote_core::{DocumentRef, WorkInstruction};
use quote_core::backend::{
    DocumentBackend, EstimateRequest, GeneratedDocument, RemoteError, WorkInstructionRequest,
    instruction_number,
};
use quote_core::validation::{ValidationError, validate_work_instruction};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::attachments::{AttachmentEncoder, EncodingError};
use crate::store::{Command, CommandError, SharedStore};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    State(#[from] CommandError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Generated(GeneratedDocument),
    /// The same workflow was already running; nothing was sent.
    AlreadyInFlight,
    /// The session was reset while the call was pending.
    Discarded,
}

/// Holds a workflow's in-flight flag for as long as it lives.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SubmissionOrchestrator {
    store: SharedStore,
    backend: Arc<dyn DocumentBackend>,
    encoder: Arc<dyn AttachmentEncoder>,
    estimate_in_flight: AtomicBool,
    instruction_in_flight: AtomicBool,
}

impl SubmissionOrchestrator {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn DocumentBackend>,
        encoder: Arc<dyn AttachmentEncoder>,
    ) -> Self {
        Self {
            store,
            backend,
            encoder,
            estimate_in_flight: AtomicBool::new(false),
            instruction_in_flight: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn estimate_pending(&self) -> bool {
        self.estimate_in_flight.load(Ordering::Acquire)
    }

    pub fn instruction_pending(&self) -> bool {
        self.instruction_in_flight.load(Ordering::Acquire)
    }

    pub async fn generate_estimate(&self) -> Result<SubmissionOutcome, SubmissionError> {
        let Some(_in_flight) = InFlight::acquire(&self.estimate_in_flight) else {
            debug!("estimate generation already in flight");
            return Ok(SubmissionOutcome::AlreadyInFlight);
        };

        let snapshot = self.store.snapshot();
        snapshot.state.check_confirmation()?;

        let images = self.encoder.encode(&snapshot.state.attachments).await?;
        let request = EstimateRequest::new(
            &snapshot.state.customer_info,
            &snapshot.state.line_items,
            images,
        );
        debug!(
            items = request.items.len(),
            images = request.images.len(),
            total = snapshot.total_amount,
            "requesting estimate"
        );

        let result = self.backend.generate_estimate(request).await;
        self.finish(
            "estimate",
            snapshot.epoch,
            result,
            |reference| Command::MarkQuoteGenerated { reference },
        )
    }

    pub async fn generate_work_instruction(&self) -> Result<SubmissionOutcome, SubmissionError> {
        let Some(_in_flight) = InFlight::acquire(&self.instruction_in_flight) else {
            debug!("work instruction generation already in flight");
            return Ok(SubmissionOutcome::AlreadyInFlight);
        };

        let snapshot = self.store.snapshot();
        snapshot.state.check_confirmation()?;

        // An unopened record is sent with its defaults and only committed
        // once generation succeeds.
        let instruction = snapshot.state.work_instruction.clone().unwrap_or_else(|| {
            WorkInstruction::from_defaults(
                &snapshot.state.customer_info,
                snapshot.total_amount,
                snapshot.tax_rate,
            )
        });
        let check = validate_work_instruction(&instruction);
        if !check.valid {
            return Err(ValidationError::Fields(check.errors).into());
        }

        let request = WorkInstructionRequest::new(
            instruction_number(&Local::now()),
            &snapshot.state.customer_info,
            &snapshot.state.line_items,
            &instruction,
        );
        debug!(instruction_no = %request.instruction_no, "requesting work instruction");

        let result = self.backend.generate_work_instruction(request).await;
        self.finish(
            "work_instruction",
            snapshot.epoch,
            result,
            |reference| Command::MarkInstructionsGenerated { reference },
        )
    }

    fn finish(
        &self,
        kind: &'static str,
        epoch: u64,
        result: Result<GeneratedDocument, RemoteError>,
        mark: impl FnOnce(DocumentRef) -> Command,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        // Stale results are dropped whether they succeeded or not.
        if self.store.epoch() != epoch {
            debug!(kind, "discarding response for an abandoned session");
            return Ok(SubmissionOutcome::Discarded);
        }

        let document = match result {
            Ok(document) => document,
            Err(e) if e.is_rejection() => {
                warn!(kind, error = %e, "document request rejected");
                return Err(e.into());
            }
            Err(e) => {
                error!(kind, error = %e, "document generation failed");
                return Err(e.into());
            }
        };

        if !self
            .store
            .dispatch_if_current(epoch, mark(document.reference.clone()))?
        {
            debug!(kind, "discarding response for an abandoned session");
            return Ok(SubmissionOutcome::Discarded);
        }

        info!(kind, reference = %document.reference, "document generated");
        Ok(SubmissionOutcome::Generated(document))
    }
}
