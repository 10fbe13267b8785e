use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use quote_core::backend::load_catalog_with_fallback;
use quote_core::calculations::common::format_yen;
use quote_core::{CustomerInfo, CustomerInfoStore, WorkInstructionField};
use quote_wizard::api_client::HttpBackend;
use quote_wizard::app::{self, WizardSession};
use quote_wizard::attachments::CountingPreviewTracker;
use quote_wizard::utils::{parse_optional_yen, parse_yen};
use quote_wizard::{Command, SubmissionOutcome, WizardConfig, csv_loader, logging};

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Disposal quote wizard.
///
/// Builds an estimate or a work instruction from an order CSV and the
/// customer's contact details, and saves the generated PDF.
#[derive(Debug, Parser)]
struct Cli {
    /// Configuration file. Missing files fall back to defaults.
    #[arg(long, default_value = "quote-wizard.toml")]
    config: PathBuf,

    /// Base URL of the document service, overriding the config file.
    #[arg(long)]
    api_url: Option<String>,

    /// Also append log output to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `info,quote_wizard=trace`.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List the disposal item catalog.
    Catalog {
        /// Sort categories and items by name.
        #[arg(long)]
        sort: bool,
    },
    /// Generate an estimate PDF.
    Quote(OrderArgs),
    /// Generate a work instruction PDF.
    Instruct(InstructArgs),
}

/// Contact fields. Anything omitted is taken from the last saved customer.
#[derive(Debug, Args)]
struct CustomerArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    /// Preferred disposal date (YYYY-MM-DD).
    #[arg(long)]
    disposal_date: Option<String>,
}

impl CustomerArgs {
    fn merge_onto(
        self,
        prefill: Option<CustomerInfo>,
    ) -> CustomerInfo {
        let base = prefill.unwrap_or_default();
        CustomerInfo {
            name: self.name.unwrap_or(base.name),
            address: self.address.unwrap_or(base.address),
            phone: self.phone.unwrap_or(base.phone),
            email: self.email.or(base.email),
            disposal_date: self.disposal_date.or(base.disposal_date),
        }
        .normalized()
    }
}

#[derive(Debug, Args)]
struct OrderArgs {
    /// Order CSV (`id,name,price,quantity,category,custom_price`).
    #[arg(long)]
    order: PathBuf,

    /// Photo to attach. Repeat for several files.
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    #[command(flatten)]
    customer: CustomerArgs,
}

#[derive(Debug, Args)]
struct InstructArgs {
    #[command(flatten)]
    order: OrderArgs,

    /// Collection date; defaults to the disposal date.
    #[arg(long)]
    collection_date: Option<String>,

    /// Amount collected including tax; defaults to the order total.
    #[arg(long)]
    amount: Option<String>,

    /// Explicit tax-excluded amount instead of the derived one.
    #[arg(long)]
    amount_excluded: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    #[arg(long)]
    work_slip_done: bool,

    #[arg(long)]
    weighing_done: bool,

    #[arg(long)]
    manifest_done: bool,

    #[arg(long)]
    recycle_ticket_done: bool,

    #[arg(long)]
    points_eligible: bool,

    #[arg(long, default_value = "0")]
    points_used: i64,
}

impl InstructArgs {
    fn fields(&self) -> anyhow::Result<Vec<WorkInstructionField>> {
        let mut fields = vec![
            WorkInstructionField::Notes(self.notes.clone()),
            WorkInstructionField::WorkSlipDone(self.work_slip_done),
            WorkInstructionField::WeighingDone(self.weighing_done),
            WorkInstructionField::ManifestDone(self.manifest_done),
            WorkInstructionField::RecycleTicketDone(self.recycle_ticket_done),
            WorkInstructionField::PointsEligible(self.points_eligible),
            WorkInstructionField::PointsUsed(self.points_used),
        ];
        if let Some(date) = &self.collection_date {
            fields.push(WorkInstructionField::CollectionDate(date.clone()));
        }
        if let Some(amount) = &self.amount {
            fields.push(WorkInstructionField::AmountTaxIncluded(parse_yen(amount)?));
        }
        if let Some(amount) = self
            .amount_excluded
            .as_deref()
            .map(parse_optional_yen)
            .transpose()?
            .flatten()
        {
            fields.push(WorkInstructionField::AmountTaxExcludedOverride(amount));
        }
        Ok(fields)
    }
}

// ─── commands ────────────────────────────────────────────────────────────────

async fn prepare_session(
    config: &WizardConfig,
    backend: Arc<HttpBackend>,
    prefill: &dyn CustomerInfoStore,
    order: OrderArgs,
) -> anyhow::Result<(WizardSession, CustomerInfo)> {
    let session = WizardSession::new(config, backend, Arc::new(CountingPreviewTracker::new()));

    let customer = order
        .customer
        .merge_onto(app::load_prefill(prefill).await);
    session.store.dispatch(Command::SetCustomerInfo {
        info: customer.clone(),
    })?;

    let lines = csv_loader::load_from_file(&order.order)
        .with_context(|| format!("cannot load order '{}'", order.order.display()))?;
    debug!(lines = lines.len(), "order loaded");
    session.add_lines(&lines)?;
    session.attach_files(&order.images).await?;

    if let Err(e) = session.store.with(|s| s.advance_to_confirmation()) {
        bail!("order is incomplete: {e}");
    }
    Ok((session, customer))
}

async fn finish(
    outcome: SubmissionOutcome,
    config: &WizardConfig,
    prefill: &dyn CustomerInfoStore,
    customer: &CustomerInfo,
) -> anyhow::Result<()> {
    match outcome {
        SubmissionOutcome::Generated(document) => {
            if let Some(path) = app::save_document(&config.output_dir, &document).await? {
                info!("saved {}", path.display());
            } else {
                info!("document available at {}", document.reference);
            }
            if let Err(error) = prefill.save_last(customer).await {
                warn!(%error, "could not remember customer details");
            }
            Ok(())
        }
        SubmissionOutcome::AlreadyInFlight | SubmissionOutcome::Discarded => {
            bail!("generation did not complete")
        }
    }
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_default_logging();

    let cli = Cli::parse();

    if let Some(level) = &cli.log_level {
        logging::set_log_level(level)?;
    }
    if let Some(path) = &cli.log_file {
        logging::enable_file_logging(path)?;
    }

    let mut config = WizardConfig::load(Some(&cli.config))?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    debug!(api = %config.api_base_url, tax_rate = %config.tax_rate, "configuration ready");

    let backend = Arc::new(HttpBackend::new(
        &config.api_base_url,
        config.request_timeout(),
    )?);

    match cli.command {
        CliCommand::Catalog { sort } => {
            let catalog = load_catalog_with_fallback(&*backend, sort).await;
            debug!(origin = ?catalog.origin, "catalog loaded");
            for category in &catalog.categories {
                info!("{} ({})", category.name, category.id);
                for item in &category.items {
                    info!("  {:<24} {:>10}  {}", item.id, format_yen(item.price), item.name);
                }
            }
        }
        CliCommand::Quote(order) => {
            let prefill = app::open_prefill_store(&config.prefill).await?;
            let (session, customer) =
                prepare_session(&config, backend, &*prefill, order).await?;
            info!("\n{}", session.summary());

            let result = match session.orchestrator.generate_estimate().await {
                Ok(outcome) => finish(outcome, &config, &*prefill, &customer).await,
                Err(e) => Err(e.into()),
            };
            session.store.teardown();
            result?;
        }
        CliCommand::Instruct(args) => {
            let fields = args.fields()?;
            let prefill = app::open_prefill_store(&config.prefill).await?;
            let (session, customer) =
                prepare_session(&config, backend, &*prefill, args.order).await?;

            session.store.dispatch(Command::OpenWorkInstruction)?;
            for field in fields {
                session
                    .store
                    .dispatch(Command::SetWorkInstructionField { field })?;
            }

            let result = match session.orchestrator.generate_work_instruction().await {
                Ok(outcome) => finish(outcome, &config, &*prefill, &customer).await,
                Err(e) => Err(e.into()),
            };
            session.store.teardown();
            result?;
        }
    }

    Ok(())
}
