//! Wizard state for one quoting session.
//!
//! Screens never mutate [`WizardState`] directly. They send a [`Command`] to
//! [`WizardStore::dispatch`], which builds the next state from a copy and
//! swaps it in only when the whole command succeeded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quote_core::calculations::wizard_total;
use quote_core::validation::{ValidationError, validate_custom_item, validate_customer_info};
use quote_core::{
    CatalogItem, CustomerInfo, CustomerInfoPatch, DocumentRef, GeneratedDocuments, LineItem,
    LineItemPatch, WorkInstruction, WorkInstructionField, Yen,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::attachments::{Attachment, AttachmentError, AttachmentId, AttachmentManager, NewAttachment};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WizardState {
    pub customer_info: CustomerInfo,
    pub line_items: Vec<LineItem>,
    pub attachments: Vec<Attachment>,
    pub work_instruction: Option<WorkInstruction>,
    pub quote_generated: bool,
    pub instructions_generated: bool,
    pub documents: GeneratedDocuments,
}

impl WizardState {
    pub fn total_amount(&self) -> Yen {
        wizard_total(&self.line_items)
    }

    pub fn progress(&self) -> WizardProgress {
        if self.instructions_generated {
            WizardProgress::InstructionsGenerated
        } else if self.quote_generated {
            WizardProgress::QuoteGenerated
        } else if self.check_confirmation().is_ok() {
            WizardProgress::ReadyToQuote
        } else {
            WizardProgress::Collecting
        }
    }

    /// Gate for moving to the confirmation step: required customer fields
    /// present and at least one item selected.
    pub fn check_confirmation(&self) -> Result<(), ValidationError> {
        let customer = validate_customer_info(&self.customer_info);
        let has_items = !self.line_items.is_empty();

        match (customer.valid, has_items) {
            (true, true) => Ok(()),
            (true, false) => Err(ValidationError::NoItems),
            (false, true) => Err(ValidationError::CustomerInfo {
                missing_fields: customer.missing_fields,
            }),
            (false, false) => Err(ValidationError::CustomerInfoAndItems {
                missing_fields: customer.missing_fields,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardProgress {
    Collecting,
    ReadyToQuote,
    QuoteGenerated,
    InstructionsGenerated,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Every change a screen may request.
///
/// Tagged by `type` on the wire; unrecognised tags decode to
/// [`Command::Unknown`], which dispatch ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    SetCustomerInfo {
        info: CustomerInfo,
    },
    UpdateCustomerInfo {
        patch: CustomerInfoPatch,
    },
    AddLineItem {
        item: CatalogItem,
    },
    AddCustomItem {
        name: String,
        price: Yen,
    },
    UpdateLineItem {
        id: String,
        patch: LineItemPatch,
    },
    RemoveLineItem {
        id: String,
    },
    AddAttachment {
        file: NewAttachment,
    },
    RemoveAttachment {
        id: AttachmentId,
    },
    /// Seeds the work instruction from the current totals if it does not exist yet.
    OpenWorkInstruction,
    SetWorkInstructionField {
        field: WorkInstructionField,
    },
    MarkQuoteGenerated {
        reference: DocumentRef,
    },
    MarkInstructionsGenerated {
        reference: DocumentRef,
    },
    Reset,
    #[serde(other)]
    Unknown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::SetCustomerInfo { .. } => "set_customer_info",
            Self::UpdateCustomerInfo { .. } => "update_customer_info",
            Self::AddLineItem { .. } => "add_line_item",
            Self::AddCustomItem { .. } => "add_custom_item",
            Self::UpdateLineItem { .. } => "update_line_item",
            Self::RemoveLineItem { .. } => "remove_line_item",
            Self::AddAttachment { .. } => "add_attachment",
            Self::RemoveAttachment { .. } => "remove_attachment",
            Self::OpenWorkInstruction => "open_work_instruction",
            Self::SetWorkInstructionField { .. } => "set_work_instruction_field",
            Self::MarkQuoteGenerated { .. } => "mark_quote_generated",
            Self::MarkInstructionsGenerated { .. } => "mark_instructions_generated",
            Self::Reset => "reset",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error("work instruction is locked after generation")]
    WorkInstructionLocked,

    #[error("work instruction has not been opened")]
    WorkInstructionMissing,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Point-in-time copy handed to the submission workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardSnapshot {
    pub state: WizardState,
    pub epoch: u64,
    pub version: u64,
    pub total_amount: Yen,
    pub tax_rate: Decimal,
}

#[derive(Debug)]
pub struct WizardStore {
    state: WizardState,
    attachments: AttachmentManager,
    tax_rate: Decimal,
    version: u64,
    epoch: u64,
}

impl WizardStore {
    pub fn new(
        tax_rate: Decimal,
        attachments: AttachmentManager,
    ) -> Self {
        Self {
            state: WizardState::default(),
            attachments,
            tax_rate,
            version: 0,
            epoch: 0,
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn attachments(&self) -> &AttachmentManager {
        &self.attachments
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Incremented on every applied change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Session token. Changes on every reset.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn total_amount(&self) -> Yen {
        self.state.total_amount()
    }

    pub fn progress(&self) -> WizardProgress {
        self.state.progress()
    }

    pub fn advance_to_confirmation(&self) -> Result<(), ValidationError> {
        self.state.check_confirmation()
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            state: self.state.clone(),
            epoch: self.epoch,
            version: self.version,
            total_amount: self.total_amount(),
            tax_rate: self.tax_rate,
        }
    }

    /// Opens the work instruction on first use, seeded from the current
    /// customer and total.
    pub fn ensure_work_instruction(&mut self) -> Result<&WorkInstruction, CommandError> {
        self.dispatch(Command::OpenWorkInstruction)?;
        self.state
            .work_instruction
            .as_ref()
            .ok_or(CommandError::WorkInstructionMissing)
    }

    fn seed_work_instruction(&self) -> WorkInstruction {
        WorkInstruction::from_defaults(
            &self.state.customer_info,
            self.total_amount(),
            self.tax_rate,
        )
    }

    /// Discards the session: previews are released, state returns to the
    /// initial value and the epoch moves on so in-flight results are dropped.
    pub fn reset(&mut self) {
        self.attachments.release_all(&self.state.attachments);
        self.state = WizardState::default();
        self.epoch += 1;
        self.version += 1;
        debug!(epoch = self.epoch, "wizard reset");
    }

    /// Ends the session. The store stays usable as a fresh wizard.
    pub fn teardown(&mut self) {
        self.reset();
    }

    pub fn dispatch(
        &mut self,
        command: Command,
    ) -> Result<(), CommandError> {
        let name = command.name();

        if matches!(command, Command::Reset) {
            self.reset();
            return Ok(());
        }

        match self.next_state(command)? {
            Some(next) => {
                self.state = next;
                self.version += 1;
                debug!(command = name, version = self.version, "command applied");
            }
            None => debug!(command = name, "command had no effect"),
        }
        Ok(())
    }

    /// `None` means the command is a no-op for the current state.
    fn next_state(
        &self,
        command: Command,
    ) -> Result<Option<WizardState>, CommandError> {
        let mut next = self.state.clone();

        match command {
            Command::SetCustomerInfo { info } => {
                next.customer_info = info.normalized();
            }
            Command::UpdateCustomerInfo { patch } => {
                next.customer_info.apply(patch);
            }
            Command::AddLineItem { item } => {
                match next.line_items.iter_mut().find(|line| line.id == item.id) {
                    Some(line) => line.quantity = line.quantity.saturating_add(1),
                    None => next.line_items.push(LineItem::from_catalog(&item)),
                }
            }
            Command::AddCustomItem { name, price } => {
                let check = validate_custom_item(&name, price);
                if !check.valid {
                    return Err(ValidationError::Fields(check.errors).into());
                }
                next.line_items.push(LineItem::custom(name.trim(), price));
            }
            Command::UpdateLineItem { id, patch } => {
                let Some(pos) = next.line_items.iter().position(|line| line.id == id) else {
                    return Ok(None);
                };
                match next.line_items[pos].patched(&patch) {
                    Some(line) => {
                        if patch.name.is_some() || patch.custom_unit_price.is_some() {
                            let check = validate_custom_item(&line.name, line.custom_unit_price);
                            if !check.valid {
                                return Err(ValidationError::Fields(check.errors).into());
                            }
                        }
                        next.line_items[pos] = line;
                    }
                    None => {
                        next.line_items.remove(pos);
                    }
                }
            }
            Command::RemoveLineItem { id } => {
                let before = next.line_items.len();
                next.line_items.retain(|line| line.id != id);
                if next.line_items.len() == before {
                    return Ok(None);
                }
            }
            Command::AddAttachment { file } => {
                next.attachments = self.attachments.add(&next.attachments, file)?;
            }
            Command::RemoveAttachment { id } => {
                if !next.attachments.iter().any(|a| a.id == id) {
                    return Ok(None);
                }
                next.attachments = self.attachments.remove(&next.attachments, &id);
            }
            Command::OpenWorkInstruction => {
                if next.work_instruction.is_some() {
                    return Ok(None);
                }
                next.work_instruction = Some(self.seed_work_instruction());
            }
            Command::SetWorkInstructionField { field } => {
                let instruction = next
                    .work_instruction
                    .as_mut()
                    .ok_or(CommandError::WorkInstructionMissing)?;
                if instruction.locked {
                    return Err(CommandError::WorkInstructionLocked);
                }
                instruction.apply(field, self.tax_rate);
            }
            Command::MarkQuoteGenerated { reference } => {
                next.quote_generated = true;
                next.documents.estimate = Some(reference);
            }
            Command::MarkInstructionsGenerated { reference } => {
                let seeded = self.seed_work_instruction();
                next.work_instruction.get_or_insert(seeded).locked = true;
                next.instructions_generated = true;
                next.documents.work_instruction = Some(reference);
            }
            Command::Reset | Command::Unknown => return Ok(None),
        }

        Ok(Some(next))
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Cloneable handle screens and workflows share. The lock is only held for
/// the duration of a synchronous call.
#[derive(Debug, Clone)]
pub struct SharedStore(Arc<Mutex<WizardStore>>);

impl SharedStore {
    pub fn new(store: WizardStore) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    fn lock(&self) -> MutexGuard<'_, WizardStore> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(
        &self,
        command: Command,
    ) -> Result<(), CommandError> {
        self.lock().dispatch(command)
    }

    /// Applies `command` only while the session is still `epoch`.
    /// Returns `false` when the session has moved on.
    pub fn dispatch_if_current(
        &self,
        epoch: u64,
        command: Command,
    ) -> Result<bool, CommandError> {
        let mut store = self.lock();
        if store.epoch() != epoch {
            return Ok(false);
        }
        store.dispatch(command)?;
        Ok(true)
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        self.lock().snapshot()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch()
    }

    pub fn ensure_work_instruction(&self) -> Result<WorkInstruction, CommandError> {
        self.lock().ensure_work_instruction().cloned()
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn teardown(&self) {
        self.lock().teardown();
    }

    pub fn with<R>(
        &self,
        f: impl FnOnce(&WizardStore) -> R,
    ) -> R {
        f(&self.lock())
    }
}
