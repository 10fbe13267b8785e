pub mod api_client;
pub mod app;
pub mod attachments;
pub mod config;
pub mod csv_loader;
pub mod logging;
pub mod store;
pub mod submission;
pub mod utils;

pub use app::{QuoteSummary, WizardSession};
pub use config::WizardConfig;
pub use store::{Command, CommandError, SharedStore, WizardProgress, WizardState, WizardStore};
pub use submission::{SubmissionError, SubmissionOrchestrator, SubmissionOutcome};
