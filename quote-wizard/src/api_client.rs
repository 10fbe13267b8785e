//! reqwest client for the catalog and document services.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use quote_core::{Category, DocumentRef};
use quote_core::backend::{
    CatalogError, CatalogSource, DocumentBackend, EstimateRequest, GeneratedDocument, RemoteError,
    WorkInstructionRequest,
};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CATEGORIES_PATH: &str = "api/v1/categories";
const ESTIMATE_PATH: &str = "api/v1/estimates/pdf";
const INSTRUCTION_PATH: &str = "api/v1/instructions/pdf";

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(
        &self,
        path: &str,
    ) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_document<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        fallback_name: String,
    ) -> Result<GeneratedDocument, RemoteError> {
        let url = self.url(path);
        debug!(%url, "posting document request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        read_document(response, fallback_name).await
    }
}

fn network_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Network(format!("request timed out: {e}"))
    } else {
        RemoteError::Network(e.to_string())
    }
}

async fn read_document(
    response: Response,
    fallback_name: String,
) -> Result<GeneratedDocument, RemoteError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(network_error)?;

    if !status.is_success() {
        return Err(classify_failure(status, &String::from_utf8_lossy(&body)));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/json") {
        return parse_json_document(&body).map(|reference| GeneratedDocument {
            reference,
            content: None,
        });
    }

    if body.is_empty() {
        return Err(RemoteError::InvalidResponse("empty document body".to_string()));
    }

    let name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_content_disposition)
        .unwrap_or(fallback_name);

    Ok(GeneratedDocument {
        reference: DocumentRef(name),
        content: Some(body.to_vec()),
    })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    pdf_url: Option<String>,
    #[serde(default)]
    data: Option<DocumentData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentData {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    field_errors: Vec<FieldMessages>,
    #[serde(default)]
    global_errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FieldMessages {
    field: String,
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CategoriesEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<CategoriesData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoriesData {
    categories: Vec<Category>,
}

/// Maps a non-2xx response to the caller-facing error. 400 and 422 are
/// rejections of the request itself; everything else is a server failure.
pub fn classify_failure(
    status: StatusCode,
    body: &str,
) -> RemoteError {
    let message = failure_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => RemoteError::Rejected {
            status: status.as_u16(),
            message,
        },
        _ => RemoteError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

fn failure_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    if let Some(error) = envelope.error.filter(|e| !e.is_empty()) {
        return Some(error);
    }

    let detail = envelope.detail?;
    let mut messages = detail.global_errors;
    for field in detail.field_errors {
        messages.extend(
            field
                .messages
                .into_iter()
                .map(|m| format!("{}: {m}", field.field)),
        );
    }
    (!messages.is_empty()).then(|| messages.join(", "))
}

/// Reads `{ success, pdfUrl }` or `{ success, data: { url } }`.
pub fn parse_json_document(body: &[u8]) -> Result<DocumentRef, RemoteError> {
    let envelope: DocumentEnvelope =
        serde_json::from_slice(body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

    if envelope.success == Some(false) {
        return Err(RemoteError::Server {
            status: StatusCode::OK.as_u16(),
            message: envelope
                .error
                .unwrap_or_else(|| "generation failed".to_string()),
        });
    }

    envelope
        .pdf_url
        .or_else(|| envelope.data.and_then(|d| d.url))
        .filter(|url| !url.is_empty())
        .map(DocumentRef)
        .ok_or_else(|| RemoteError::InvalidResponse("response carries no document URL".to_string()))
}

/// Extracts the file name from a `Content-Disposition` header, preferring
/// the RFC 5987 `filename*` form.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;

    for part in header.split(';').map(str::trim) {
        if let Some(value) = part.strip_prefix("filename*=") {
            let encoded = value.split_once("''").map_or(value, |(_, rest)| rest);
            if let Some(decoded) = percent_decode(encoded.trim_matches('"')) {
                return Some(decoded).filter(|n| !n.is_empty());
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }

    plain.filter(|n| !n.is_empty())
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn fallback_file_name(prefix: &str) -> String {
    format!("{prefix}_{}.pdf", Local::now().format("%Y%m%d%H%M%S"))
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl CatalogSource for HttpBackend {
    async fn fetch_categories(
        &self,
        sort: bool,
    ) -> Result<Vec<Category>, CatalogError> {
        let url = self.url(CATEGORIES_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("sort", sort)])
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "catalog request failed");
            return Err(CatalogError::Unavailable(format!("status {status}")));
        }

        let envelope: CategoriesEnvelope = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        match envelope {
            CategoriesEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data.categories),
            CategoriesEnvelope { error, .. } => Err(CatalogError::InvalidResponse(
                error.unwrap_or_else(|| "catalog response without data".to_string()),
            )),
        }
    }
}

#[async_trait]
impl DocumentBackend for HttpBackend {
    async fn generate_estimate(
        &self,
        request: EstimateRequest,
    ) -> Result<GeneratedDocument, RemoteError> {
        self.post_document(ESTIMATE_PATH, &request, fallback_file_name("estimate"))
            .await
    }

    async fn generate_work_instruction(
        &self,
        request: WorkInstructionRequest,
    ) -> Result<GeneratedDocument, RemoteError> {
        let fallback = format!("{}.pdf", request.instruction_no);
        self.post_document(INSTRUCTION_PATH, &request, fallback)
            .await
    }
}
