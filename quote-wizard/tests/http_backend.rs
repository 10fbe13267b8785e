use std::time::Duration;

use pretty_assertions::assert_eq;
use quote_core::backend::{
    CatalogOrigin, CatalogSource, DocumentBackend, EstimateRequest, RemoteError,
    WorkInstructionRequest, load_catalog_with_fallback,
};
use quote_core::{CatalogItem, CustomerInfo, LineItem, WorkInstruction};
use quote_wizard::api_client::HttpBackend;
use rust_decimal_macros::dec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// =============================================================================
// Stub server
// =============================================================================

fn response(
    status: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Answers a single request with `reply` and hands back what was received.
async fn serve_once(reply: Vec<u8>) -> (HttpBackend, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(&reply).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    let backend = HttpBackend::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    (backend, handle)
}

fn estimate_request() -> EstimateRequest {
    let customer = CustomerInfo::new("田中太郎", "東京都千代田区1-1", "03-1234-5678");
    let mut line = LineItem::from_catalog(&CatalogItem {
        id: "sofa-2".to_string(),
        name: "2人掛けソファ".to_string(),
        price: 1000,
        category: "家具".to_string(),
    });
    line.quantity = 2;
    EstimateRequest::new(&customer, &[line], Vec::new())
}

// =============================================================================
// Documents
// =============================================================================

#[tokio::test]
async fn inline_pdf_uses_content_disposition_name() {
    let (backend, server) = serve_once(response(
        "200 OK",
        &[
            ("Content-Type", "application/pdf"),
            ("Content-Disposition", "attachment; filename=\"estimate_42.pdf\""),
        ],
        b"%PDF-1.4 body",
    ))
    .await;

    let document = backend.generate_estimate(estimate_request()).await.unwrap();

    assert_eq!(document.reference.as_str(), "estimate_42.pdf");
    assert_eq!(document.content.as_deref(), Some(&b"%PDF-1.4 body"[..]));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/v1/estimates/pdf "));
    assert!(request.contains("\"customPrice\":1000"));
    assert!(request.contains("\"amount\":2000"));
}

#[tokio::test]
async fn validation_failure_is_rejection() {
    let (backend, _server) = serve_once(response(
        "422 Unprocessable Entity",
        &[("Content-Type", "application/json")],
        r#"{"success":false,"error":"電話番号は必須です"}"#.as_bytes(),
    ))
    .await;

    let err = backend.generate_estimate(estimate_request()).await.unwrap_err();

    assert_eq!(
        err,
        RemoteError::Rejected {
            status: 422,
            message: "電話番号は必須です".to_string(),
        }
    );
}

#[tokio::test]
async fn instruction_json_reference_is_a_url() {
    let (backend, server) = serve_once(response(
        "200 OK",
        &[("Content-Type", "application/json")],
        br#"{"success":true,"pdfUrl":"https://cdn.example.jp/INS-1.pdf"}"#,
    ))
    .await;
    let customer = CustomerInfo::new("田中太郎", "東京都千代田区1-1", "03-1234-5678");
    let mut instruction = WorkInstruction::from_defaults(&customer, 2000, dec!(0.10));
    instruction.collection_date = "2025-05-01".to_string();
    let request = WorkInstructionRequest::new("INS-1".to_string(), &customer, &[], &instruction);

    let document = backend.generate_work_instruction(request).await.unwrap();

    assert_eq!(document.reference.as_str(), "https://cdn.example.jp/INS-1.pdf");
    assert_eq!(document.content, None);
    assert!(server.await.unwrap().starts_with("POST /api/v1/instructions/pdf "));
}

#[tokio::test]
async fn unreachable_service_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let backend = HttpBackend::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

    let err = backend.generate_estimate(estimate_request()).await.unwrap_err();

    assert!(matches!(err, RemoteError::Network(_)));

    let catalog = load_catalog_with_fallback(&backend, false).await;
    assert_eq!(catalog.origin, CatalogOrigin::Fallback);
    assert!(!catalog.categories.is_empty());
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn catalog_envelope_is_unwrapped() {
    let body = r#"{"success":true,"data":{"categories":[{"id":"furniture","name":"家具","items":[{"id":"sofa-2","name":"2人掛けソファ","price":1000,"category":"furniture"}]}]}}"#;
    let (backend, server) = serve_once(response(
        "200 OK",
        &[("Content-Type", "application/json")],
        body.as_bytes(),
    ))
    .await;

    let categories = backend.fetch_categories(true).await.unwrap();

    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].items[0].price, 1000);
    assert!(server.await.unwrap().starts_with("GET /api/v1/categories?sort=true "));
}
