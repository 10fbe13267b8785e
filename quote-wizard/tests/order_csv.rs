mod common;

use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use quote_core::CUSTOM_CATEGORY;
use quote_wizard::attachments::CountingPreviewTracker;
use quote_wizard::{WizardConfig, WizardSession, csv_loader};

use common::MockBackend;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_order.csv")
}

#[test]
fn fixture_loads_in_file_order() {
    let lines = csv_loader::load_from_file(&fixture()).expect("fixture should parse");

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0].id, "sofa-2");
    assert_eq!(lines[0].quantity, 2);
    assert_eq!(lines[1].unit_price, 1500);
    assert_eq!(lines[2].category, CUSTOM_CATEGORY);
    assert_eq!(lines[2].unit_price, 800);
}

#[test]
fn fixture_populates_the_wizard() {
    let session = WizardSession::new(
        &WizardConfig::default(),
        Arc::new(MockBackend::succeeding()),
        Arc::new(CountingPreviewTracker::new()),
    );
    let lines = csv_loader::load_from_file(&fixture()).unwrap();

    session.add_lines(&lines).unwrap();

    let snapshot = session.store.snapshot();
    assert_eq!(snapshot.state.line_items.len(), 3);
    assert_eq!(snapshot.state.line_items[0].quantity, 3);
    // 1000 * 3 + 1500 + 800
    assert_eq!(snapshot.total_amount, 5300);
}

#[test]
fn missing_file_is_io_error() {
    let err = csv_loader::load_from_file(&fixture().with_file_name("absent.csv")).unwrap_err();

    assert!(matches!(err, csv_loader::CsvLoadError::Io(_)));
}
