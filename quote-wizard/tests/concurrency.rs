mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use quote_wizard::attachments::{DataUrlEncoder, NewAttachment};
use quote_wizard::{Command, SubmissionOrchestrator, SubmissionOutcome};
use tokio::sync::Notify;

use common::{MockBackend, sofa, shared_store, tanaka};

fn ready_orchestrator(
    backend: Arc<MockBackend>
) -> (quote_wizard::SharedStore, Arc<SubmissionOrchestrator>) {
    let (store, _) = shared_store();
    store
        .dispatch(Command::SetCustomerInfo { info: tanaka() })
        .unwrap();
    store.dispatch(Command::AddLineItem { item: sofa() }).unwrap();
    let orchestrator = Arc::new(SubmissionOrchestrator::new(
        store.clone(),
        backend,
        Arc::new(DataUrlEncoder),
    ));
    (store, orchestrator)
}

// =============================================================================
// In-flight guard
// =============================================================================

#[tokio::test]
async fn second_trigger_while_pending_is_ignored() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockBackend::gated(gate.clone()));
    let (_store, orchestrator) = ready_orchestrator(backend.clone());

    let (first, second) = tokio::join!(orchestrator.generate_estimate(), async {
        backend.entered.notified().await;
        assert!(orchestrator.estimate_pending());
        let outcome = orchestrator.generate_estimate().await;
        gate.notify_one();
        outcome
    });

    assert!(matches!(first.unwrap(), SubmissionOutcome::Generated(_)));
    assert_eq!(second.unwrap(), SubmissionOutcome::AlreadyInFlight);
    assert_eq!(backend.estimate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn guard_is_released_after_completion() {
    let backend = Arc::new(MockBackend::succeeding());
    let (_store, orchestrator) = ready_orchestrator(backend.clone());

    orchestrator.generate_estimate().await.unwrap();
    orchestrator.generate_estimate().await.unwrap();

    assert_eq!(backend.estimate_calls.load(Ordering::SeqCst), 2);
    assert!(!orchestrator.estimate_pending());
}

#[tokio::test]
async fn workflows_have_independent_guards() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockBackend::gated(gate.clone()));
    let (store, orchestrator) = ready_orchestrator(backend.clone());
    store
        .dispatch(Command::UpdateCustomerInfo {
            patch: quote_core::CustomerInfoPatch {
                disposal_date: Some("2025-05-01".to_string()),
                ..Default::default()
            },
        })
        .unwrap();

    let (estimate, instruction) = tokio::join!(orchestrator.generate_estimate(), async {
        backend.entered.notified().await;
        let pending = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.generate_work_instruction().await }
        });
        // Both calls are now parked on the gate.
        while backend.instruction_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(orchestrator.estimate_pending());
        assert!(orchestrator.instruction_pending());
        gate.notify_waiters();
        pending.await.unwrap()
    });

    assert!(matches!(estimate.unwrap(), SubmissionOutcome::Generated(_)));
    assert!(matches!(instruction.unwrap(), SubmissionOutcome::Generated(_)));
}

// =============================================================================
// Stale responses
// =============================================================================

#[tokio::test]
async fn response_after_reset_is_discarded() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockBackend::gated(gate.clone()));
    let (store, orchestrator) = ready_orchestrator(backend.clone());

    let pending = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.generate_estimate().await }
    });
    backend.entered.notified().await;

    store.reset();
    store
        .dispatch(Command::SetCustomerInfo { info: tanaka() })
        .unwrap();
    gate.notify_one();

    let outcome = pending.await.unwrap().unwrap();

    assert_eq!(outcome, SubmissionOutcome::Discarded);
    let state = store.snapshot().state;
    assert!(!state.quote_generated);
    assert_eq!(state.documents.estimate, None);
    assert_eq!(state.customer_info, tanaka());
}

#[tokio::test]
async fn snapshot_is_taken_before_the_call() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockBackend::gated(gate.clone()));
    let (store, orchestrator) = ready_orchestrator(backend.clone());

    let pending = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.generate_estimate().await }
    });
    backend.entered.notified().await;

    // Edits made while the call is pending do not leak into the request.
    store.dispatch(Command::AddLineItem { item: sofa() }).unwrap();
    store
        .dispatch(Command::AddAttachment {
            file: NewAttachment::from_bytes("late.png", b"x".to_vec()),
        })
        .unwrap();
    gate.notify_one();
    pending.await.unwrap().unwrap();

    let requests = backend.estimates.lock().unwrap();
    assert_eq!(requests[0].items[0].quantity, 1);
    assert!(requests[0].images.is_empty());
    assert!(store.snapshot().state.quote_generated);
}
