//! Photo attachments for the estimate.
//!
//! The manager enforces the upload budget (type, per-file size, count and
//! aggregate size) and owns the preview handles belonging to accepted files.
//! Every handle it hands out is released exactly once: on removal, on
//! [`AttachmentManager::release_all`], or when the manager is dropped.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::try_join_all;
use quote_core::backend::EncodedImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MIB: u64 = 1024 * 1024;

pub const SUPPORTED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_files: usize,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * MIB,
            max_total_bytes: 50 * MIB,
            max_files: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn generate() -> Self {
        Self(format!("img_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttachmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where the attachment bytes live until they are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AttachmentSource {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

/// A file the user picked, not yet accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub name: String,
    /// Declared type; guessed from `name` when absent.
    pub mime_type: Option<String>,
    pub byte_size: u64,
    pub source: AttachmentSource,
}

impl NewAttachment {
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            mime_type: None,
            byte_size: bytes.len() as u64,
            source: AttachmentSource::Memory(bytes),
        }
    }

    /// Describes a file on disk. Only its metadata is read here.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            mime_type: None,
            byte_size: metadata.len(),
            source: AttachmentSource::File(path.to_path_buf()),
        })
    }

    pub fn with_mime_type(
        mut self,
        mime_type: impl Into<String>,
    ) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    fn resolved_mime_type(&self) -> Option<String> {
        self.mime_type
            .clone()
            .or_else(|| mime_guess::from_path(&self.name).first().map(|m| m.essence_str().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    pub display_name: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub source: AttachmentSource,
    pub preview: PreviewHandle,
}

pub fn total_bytes(attachments: &[Attachment]) -> u64 {
    attachments.iter().map(|a| a.byte_size).sum()
}

// ---------------------------------------------------------------------------
// Preview handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewHandle(u64);

impl PreviewHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Allocates and frees the display resource behind a thumbnail.
pub trait PreviewTracker: Send + Sync {
    fn allocate(
        &self,
        id: &AttachmentId,
        name: &str,
    ) -> PreviewHandle;

    fn release(
        &self,
        handle: PreviewHandle,
    );
}

/// Tracker that only counts handles. Used by the CLI and in tests.
#[derive(Debug, Default)]
pub struct CountingPreviewTracker {
    next: AtomicU64,
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl CountingPreviewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }
}

impl PreviewTracker for CountingPreviewTracker {
    fn allocate(
        &self,
        _id: &AttachmentId,
        _name: &str,
    ) -> PreviewHandle {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        PreviewHandle(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn release(
        &self,
        _handle: PreviewHandle,
    ) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("{name}: unsupported file type {mime_type}")]
    UnsupportedType { name: String, mime_type: String },

    #[error("{name}: file is {size} bytes, limit is {limit}")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("{name}: at most {limit} files can be attached")]
    TooManyFiles { name: String, limit: usize },

    #[error("{name}: attachments would total {total} bytes, limit is {limit}")]
    TotalSizeExceeded { name: String, total: u64, limit: u64 },

    #[error("{name}: declared size {declared} bytes does not match content of {actual} bytes")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },
}

impl AttachmentError {
    /// File the rejection refers to.
    pub fn file_name(&self) -> &str {
        match self {
            Self::UnsupportedType { name, .. }
            | Self::FileTooLarge { name, .. }
            | Self::TooManyFiles { name, .. }
            | Self::TotalSizeExceeded { name, .. }
            | Self::SizeMismatch { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not encode attachment {name} ({attachment_id}): {reason}")]
pub struct EncodingError {
    pub attachment_id: AttachmentId,
    pub name: String,
    pub reason: String,
}

impl EncodingError {
    fn new(
        attachment: &Attachment,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            attachment_id: attachment.id.clone(),
            name: attachment.display_name.clone(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct AttachmentManager {
    limits: AttachmentLimits,
    tracker: Arc<dyn PreviewTracker>,
    live: Mutex<HashSet<PreviewHandle>>,
}

impl fmt::Debug for AttachmentManager {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("AttachmentManager")
            .field("limits", &self.limits)
            .field("live_previews", &self.live_previews())
            .finish()
    }
}

impl AttachmentManager {
    pub fn new(
        limits: AttachmentLimits,
        tracker: Arc<dyn PreviewTracker>,
    ) -> Self {
        Self {
            limits,
            tracker,
            live: Mutex::new(HashSet::new()),
        }
    }

    pub fn limits(&self) -> &AttachmentLimits {
        &self.limits
    }

    /// Number of preview handles allocated and not yet released.
    pub fn live_previews(&self) -> usize {
        self.live_set().len()
    }

    fn live_set(&self) -> std::sync::MutexGuard<'_, HashSet<PreviewHandle>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks `file` against the budget without allocating anything.
    /// Returns the MIME type the attachment will carry.
    pub fn check(
        &self,
        current: &[Attachment],
        file: &NewAttachment,
    ) -> Result<String, AttachmentError> {
        let mime_type = file
            .resolved_mime_type()
            .filter(|m| SUPPORTED_MIME_TYPES.contains(&m.as_str()))
            .ok_or_else(|| AttachmentError::UnsupportedType {
                name: file.name.clone(),
                mime_type: file
                    .resolved_mime_type()
                    .unwrap_or_else(|| "unknown".to_string()),
            })?;

        // In-memory content is measured; file sizes come from metadata.
        if let AttachmentSource::Memory(bytes) = &file.source {
            let actual = bytes.len() as u64;
            if actual != file.byte_size {
                return Err(AttachmentError::SizeMismatch {
                    name: file.name.clone(),
                    declared: file.byte_size,
                    actual,
                });
            }
        }

        if file.byte_size > self.limits.max_file_bytes {
            return Err(AttachmentError::FileTooLarge {
                name: file.name.clone(),
                size: file.byte_size,
                limit: self.limits.max_file_bytes,
            });
        }

        if current.len() + 1 > self.limits.max_files {
            return Err(AttachmentError::TooManyFiles {
                name: file.name.clone(),
                limit: self.limits.max_files,
            });
        }

        let total = total_bytes(current).saturating_add(file.byte_size);
        if total > self.limits.max_total_bytes {
            return Err(AttachmentError::TotalSizeExceeded {
                name: file.name.clone(),
                total,
                limit: self.limits.max_total_bytes,
            });
        }

        Ok(mime_type)
    }

    /// Returns `current` with `file` appended. On rejection no preview is
    /// allocated and the caller keeps its list as it was.
    pub fn add(
        &self,
        current: &[Attachment],
        file: NewAttachment,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let mime_type = self.check(current, &file).inspect_err(|e| {
            warn!(file = e.file_name(), error = %e, "attachment rejected");
        })?;

        let id = AttachmentId::generate();
        let preview = self.tracker.allocate(&id, &file.name);
        self.live_set().insert(preview);
        debug!(%id, name = %file.name, size = file.byte_size, "attachment accepted");

        let mut next = current.to_vec();
        next.push(Attachment {
            id,
            display_name: file.name,
            mime_type,
            byte_size: file.byte_size,
            source: file.source,
            preview,
        });
        Ok(next)
    }

    /// Returns `current` without `id`, releasing its preview. Unknown ids
    /// leave the list as it was.
    pub fn remove(
        &self,
        current: &[Attachment],
        id: &AttachmentId,
    ) -> Vec<Attachment> {
        let mut next = current.to_vec();
        if let Some(pos) = next.iter().position(|a| &a.id == id) {
            let removed = next.remove(pos);
            self.release(removed.preview);
        }
        next
    }

    pub fn release_all(
        &self,
        current: &[Attachment],
    ) {
        for attachment in current {
            self.release(attachment.preview);
        }
    }

    fn release(
        &self,
        handle: PreviewHandle,
    ) {
        if self.live_set().remove(&handle) {
            self.tracker.release(handle);
        }
    }
}

impl Drop for AttachmentManager {
    fn drop(&mut self) {
        let remaining: Vec<_> = self.live_set().drain().collect();
        for handle in remaining {
            self.tracker.release(handle);
        }
    }
}

// ---------------------------------------------------------------------------
// Transport encoding
// ---------------------------------------------------------------------------

/// Turns attachments into the wire form expected by the estimate call.
#[async_trait]
pub trait AttachmentEncoder: Send + Sync {
    async fn encode(
        &self,
        attachments: &[Attachment],
    ) -> Result<Vec<EncodedImage>, EncodingError>;
}

/// Base64 data-URL encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataUrlEncoder;

#[async_trait]
impl AttachmentEncoder for DataUrlEncoder {
    async fn encode(
        &self,
        attachments: &[Attachment],
    ) -> Result<Vec<EncodedImage>, EncodingError> {
        encode_for_transport(attachments).await
    }
}

/// Encodes every attachment concurrently. Output follows input order.
/// The first failure fails the whole batch.
pub async fn encode_for_transport(
    attachments: &[Attachment]
) -> Result<Vec<EncodedImage>, EncodingError> {
    try_join_all(attachments.iter().map(encode_one)).await
}

async fn encode_one(attachment: &Attachment) -> Result<EncodedImage, EncodingError> {
    let bytes: Arc<[u8]> = match &attachment.source {
        AttachmentSource::Memory(bytes) => bytes.clone(),
        AttachmentSource::File(path) => tokio::fs::read(path)
            .await
            .map_err(|e| EncodingError::new(attachment, e.to_string()))?
            .into(),
    };

    if bytes.len() as u64 != attachment.byte_size {
        return Err(EncodingError::new(
            attachment,
            format!(
                "expected {} bytes, read {}",
                attachment.byte_size,
                bytes.len()
            ),
        ));
    }

    let payload = tokio::task::spawn_blocking(move || STANDARD.encode(&bytes))
        .await
        .map_err(|e| EncodingError::new(attachment, e.to_string()))?;

    Ok(EncodedImage {
        id: attachment.id.to_string(),
        name: attachment.display_name.clone(),
        data: format!("data:{};base64,{}", attachment.mime_type, payload),
    })
}
