//! Session wiring shared by the CLI and the integration tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use quote_core::backend::{DocumentBackend, GeneratedDocument, StoreConfig, StoreRegistry};
use quote_core::calculations::EstimateTotals;
use quote_core::calculations::common::format_yen;
use quote_core::{CatalogItem, CustomerInfoStore, LineItem, LineItemPatch};
use quote_store_sqlite::SqliteStoreFactory;
use tracing::{debug, info, warn};

use crate::attachments::{AttachmentManager, DataUrlEncoder, NewAttachment, PreviewTracker};
use crate::config::WizardConfig;
use crate::store::{Command, CommandError, SharedStore, WizardSnapshot, WizardStore};
use crate::submission::SubmissionOrchestrator;
use crate::utils::opt_display;

/// Registry with every prefill backend this binary ships.
pub fn build_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::new();
    registry.register(Box::new(SqliteStoreFactory));
    registry
}

pub async fn open_prefill_store(config: &StoreConfig) -> Result<Box<dyn CustomerInfoStore>> {
    debug!(backend = %config.backend, "opening prefill store");
    build_registry()
        .create(config)
        .await
        .with_context(|| format!("cannot open '{}' prefill store", config.backend))
}

/// One wizard run: the store plus the workflows operating on it.
pub struct WizardSession {
    pub store: SharedStore,
    pub orchestrator: SubmissionOrchestrator,
}

impl WizardSession {
    pub fn new(
        config: &WizardConfig,
        backend: Arc<dyn DocumentBackend>,
        previews: Arc<dyn PreviewTracker>,
    ) -> Self {
        let attachments = AttachmentManager::new(config.attachments, previews);
        let store = SharedStore::new(WizardStore::new(config.tax_rate, attachments));
        let orchestrator =
            SubmissionOrchestrator::new(store.clone(), backend, Arc::new(DataUrlEncoder));
        Self {
            store,
            orchestrator,
        }
    }

    /// Adds each order line, merging by id, then applies its quantity and
    /// negotiated price.
    pub fn add_lines(
        &self,
        lines: &[LineItem],
    ) -> Result<(), CommandError> {
        for line in lines {
            self.store.dispatch(Command::AddLineItem {
                item: CatalogItem {
                    id: line.id.clone(),
                    name: line.name.clone(),
                    price: line.unit_price,
                    category: line.category.clone(),
                },
            })?;

            let current = self.store.with(|s| {
                s.state()
                    .line_items
                    .iter()
                    .find(|l| l.id == line.id)
                    .map(|l| l.quantity)
            });
            let quantity = current.map_or(line.quantity, |q| {
                q.saturating_sub(1).saturating_add(line.quantity)
            });

            self.store.dispatch(Command::UpdateLineItem {
                id: line.id.clone(),
                patch: LineItemPatch {
                    quantity: Some(i64::from(quantity)),
                    custom_unit_price: Some(line.custom_unit_price),
                    ..Default::default()
                },
            })?;
        }
        Ok(())
    }

    pub async fn attach_files(
        &self,
        paths: &[PathBuf],
    ) -> Result<()> {
        for path in paths {
            let file = NewAttachment::from_path(path)
                .await
                .with_context(|| format!("cannot read attachment '{}'", path.display()))?;
            self.store.dispatch(Command::AddAttachment { file })?;
        }
        Ok(())
    }

    pub fn summary(&self) -> QuoteSummary {
        QuoteSummary::from(&self.store.snapshot())
    }
}

/// Loads the last customer record, if the store has one. Failures are
/// logged and treated as "no record".
pub async fn load_prefill(store: &dyn CustomerInfoStore) -> Option<quote_core::CustomerInfo> {
    match store.load_last().await {
        Ok(info) => info,
        Err(error) => {
            warn!(%error, "prefill unavailable");
            None
        }
    }
}

/// Writes inline PDF bytes to `dir`. URL references have nothing to write.
pub async fn save_document(
    dir: &Path,
    document: &GeneratedDocument,
) -> Result<Option<PathBuf>> {
    let Some(content) = &document.content else {
        info!(reference = %document.reference, "document available remotely");
        return Ok(None);
    };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("cannot create output directory '{}'", dir.display()))?;

    let file_name = Path::new(document.reference.as_str())
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "document.pdf".into());
    let path = dir.join(file_name);

    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("cannot write '{}'", path.display()))?;
    info!(path = %path.display(), bytes = content.len(), "document saved");
    Ok(Some(path))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Printable recap of the confirmation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSummary {
    pub customer_name: String,
    pub address: String,
    pub phone: String,
    pub email: Option<String>,
    pub lines: Vec<LineItem>,
    pub attachments: usize,
    pub totals: EstimateTotals,
}

impl From<&WizardSnapshot> for QuoteSummary {
    fn from(snapshot: &WizardSnapshot) -> Self {
        let state = &snapshot.state;
        Self {
            customer_name: state.customer_info.name.clone(),
            address: state.customer_info.address.clone(),
            phone: state.customer_info.phone.clone(),
            email: state.customer_info.email.clone(),
            lines: state.line_items.clone(),
            attachments: state.attachments.len(),
            totals: EstimateTotals::compute(&state.line_items, snapshot.tax_rate),
        }
    }
}

impl fmt::Display for QuoteSummary {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "お客様: {} 様", self.customer_name)?;
        writeln!(f, "住所:   {}", self.address)?;
        writeln!(f, "電話:   {}", self.phone)?;
        writeln!(f, "メール: {}", opt_display(self.email.as_deref()))?;
        writeln!(f)?;
        for line in &self.lines {
            writeln!(
                f,
                "  {:<20} {:>10} x {:>3} = {:>12}",
                line.name,
                format_yen(line.custom_unit_price),
                line.quantity,
                format_yen(quote_core::calculations::line_subtotal(line)),
            )?;
        }
        writeln!(f)?;
        writeln!(f, "写真:   {} 枚", self.attachments)?;
        writeln!(f, "小計:   {}", format_yen(self.totals.subtotal))?;
        writeln!(f, "消費税: {}", format_yen(self.totals.tax))?;
        write!(f, "合計:   {}", format_yen(self.totals.total))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quote_core::backend::{EstimateRequest, RemoteError, WorkInstructionRequest};
    use quote_core::{CustomerInfo, DocumentRef};

    use super::*;
    use crate::attachments::CountingPreviewTracker;

    struct NoBackend;

    #[async_trait::async_trait]
    impl DocumentBackend for NoBackend {
        async fn generate_estimate(
            &self,
            _request: EstimateRequest,
        ) -> Result<GeneratedDocument, RemoteError> {
            Err(RemoteError::Network("offline".to_string()))
        }

        async fn generate_work_instruction(
            &self,
            _request: WorkInstructionRequest,
        ) -> Result<GeneratedDocument, RemoteError> {
            Err(RemoteError::Network("offline".to_string()))
        }
    }

    fn session() -> WizardSession {
        WizardSession::new(
            &WizardConfig::default(),
            Arc::new(NoBackend),
            Arc::new(CountingPreviewTracker::new()),
        )
    }

    fn line(
        id: &str,
        price: i64,
        quantity: u32,
    ) -> LineItem {
        let mut line = LineItem::from_catalog(&CatalogItem {
            id: id.to_string(),
            name: id.to_string(),
            price,
            category: "家具".to_string(),
        });
        line.quantity = quantity;
        line
    }

    #[test]
    fn registry_offers_memory_and_sqlite() {
        assert_eq!(build_registry().available_backends(), vec!["memory", "sqlite"]);
    }

    #[test]
    fn add_lines_merges_repeated_ids() {
        let session = session();

        session
            .add_lines(&[line("sofa", 1000, 2), line("tv", 1500, 1), line("sofa", 1000, 3)])
            .unwrap();

        let items = session.store.snapshot().state.line_items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 5);
        assert_eq!(session.store.snapshot().total_amount, 6500);
    }

    #[test]
    fn add_lines_keeps_negotiated_price() {
        let session = session();
        let mut discounted = line("fridge", 3000, 1);
        discounted.custom_unit_price = 2500;

        session.add_lines(&[discounted]).unwrap();

        assert_eq!(session.store.snapshot().total_amount, 2500);
    }

    #[test]
    fn summary_shows_totals_with_tax() {
        let session = session();
        session
            .store
            .dispatch(Command::SetCustomerInfo {
                info: CustomerInfo::new("田中太郎", "東京都", "03-0000-0000"),
            })
            .unwrap();
        session.add_lines(&[line("sofa", 1000, 2)]).unwrap();

        let summary = session.summary();
        assert_eq!(summary.totals.subtotal, 2000);
        assert_eq!(summary.totals.tax, 200);
        assert_eq!(summary.totals.total, 2200);

        let text = summary.to_string();
        assert!(text.contains("田中太郎"));
        assert!(text.contains("2,200円"));
    }

    #[tokio::test]
    async fn save_document_writes_inline_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let document = GeneratedDocument {
            reference: DocumentRef("estimate_1.pdf".to_string()),
            content: Some(b"%PDF-1.4".to_vec()),
        };

        let path = save_document(dir.path(), &document).await.unwrap().unwrap();

        assert_eq!(path, dir.path().join("estimate_1.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn save_document_skips_url_reference() {
        let dir = tempfile::tempdir().unwrap();
        let document = GeneratedDocument {
            reference: DocumentRef("https://cdn/q.pdf".to_string()),
            content: None,
        };

        assert_eq!(save_document(dir.path(), &document).await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_prefill_round_trip() {
        let store = open_prefill_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(load_prefill(&*store).await, None);

        let info = CustomerInfo::new("田中太郎", "東京都", "03-0000-0000");
        store.save_last(&info).await.unwrap();

        assert_eq!(load_prefill(&*store).await, Some(info));
    }
}
