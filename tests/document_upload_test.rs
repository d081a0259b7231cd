use std::io::Write;
use std::path::Path;

use counsel::error::Error;
use counsel::gemini::GeminiClient;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fake_pdf() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("constitution")
        .suffix(".pdf")
        .tempfile()
        .unwrap();
    file.write_all(b"%PDF-1.4 fake document body").unwrap();
    file
}

#[test_log::test(tokio::test)]
async fn test_upload_returns_document_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-api-key", "k1"))
        .and(header("x-goog-upload-protocol", "multipart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": {
                "name": "files/abc123",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                "mimeType": "application/pdf",
                "state": "ACTIVE"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("k1", server.uri());
    let pdf = fake_pdf();
    let handle = client.upload_file(pdf.path()).await.unwrap();

    assert_eq!(handle.name, "files/abc123");
    assert_eq!(handle.mime_type, "application/pdf");
    assert!(handle.uri.ends_with("/files/abc123"));
}

#[test_log::test(tokio::test)]
async fn test_upload_sends_multipart_metadata_and_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": {"name": "files/x", "uri": "u", "mimeType": "application/pdf"}
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("k1", server.uri());
    let pdf = fake_pdf();
    client.upload_file(pdf.path()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("displayName"));
    assert!(body.contains("Content-Type: application/pdf"));
    assert!(body.contains("%PDF-1.4 fake document body"));
}

#[test_log::test(tokio::test)]
async fn test_missing_file_fails_before_any_request() {
    let server = MockServer::start().await;
    let client = GeminiClient::with_base_url("k1", server.uri());

    let result = client
        .upload_file(Path::new("/definitely/not/here.pdf"))
        .await;

    assert!(matches!(result, Err(Error::ResourceNotFound(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_rejected_upload_surfaces_status_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("bad-key", server.uri());
    let pdf = fake_pdf();
    let err = client.upload_file(pdf.path()).await.unwrap_err();

    match err {
        Error::Upload(detail) => {
            assert!(detail.contains("403"));
            assert!(detail.contains("API key invalid"));
        }
        other => panic!("expected Upload error, got {other:?}"),
    }
}
