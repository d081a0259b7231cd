//! Client for the Gemini API: one-time file upload plus streaming generation.
//!
//! Uploads use the Files API simple multipart protocol; generation uses the
//! `streamGenerateContent` endpoint with `alt=sse` and forwards each text
//! increment through an mpsc channel.

use std::path::Path;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::constants::GEMINI_BASE_URL;
use crate::error::Error;

/// Request body for `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// One conversational turn in a request or response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.into()),
                file_data: None,
            }],
        }
    }

    pub fn file(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: None,
                file_data: Some(FileData {
                    mime_type: mime_type.into(),
                    file_uri: file_uri.into(),
                }),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

/// Reference to a file previously uploaded through the Files API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// One streamed event body from `streamGenerateContent`.
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Opaque reference returned by the Files API after upload.
///
/// Established once at startup and shared read-only by every chat turn.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHandle {
    /// File resource name (e.g., "files/abc123").
    pub name: String,
    /// URI to reference in generation requests.
    #[serde(default)]
    pub uri: String,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
struct UploadFileResponse {
    file: DocumentHandle,
}

/// Events forwarded while a streaming reply is in flight.
#[derive(Debug, Clone)]
pub enum GeminiStreamEvent {
    /// One text increment (a delta, not a running total).
    Text(String),
    /// The stream finished cleanly.
    End,
    /// The stream failed; no further events follow.
    Error(String),
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, GEMINI_BASE_URL.clone())
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Upload a local file, returning the handle to reuse in every request.
    ///
    /// Called exactly once at startup; any failure is fatal to the caller.
    pub async fn upload_file(&self, path: &Path) -> Result<DocumentHandle, Error> {
        if !path.exists() {
            return Err(Error::ResourceNotFound(path.to_path_buf()));
        }

        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream");
        let data = tokio::fs::read(path).await?;

        let boundary = format!(
            "----counsel{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let body = multipart_related_body(&boundary, display_name, mime_type, &data);

        let url = format!("{}/upload/v1beta/files", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "multipart")
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!("{status}: {detail}")));
        }

        let uploaded: UploadFileResponse = response.json().await?;
        Ok(uploaded.file)
    }

    /// Invoke `streamGenerateContent` and forward each text increment to `tx`.
    ///
    /// Always terminates the channel with either `End` or `Error` so the
    /// receiver never has to guess how the stream finished.
    pub async fn stream_generate(
        &self,
        model: &str,
        request: GenerateContentRequest,
        tx: mpsc::Sender<GeminiStreamEvent>,
    ) -> Result<(), Error> {
        let url = format!(
            "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        );

        let response = match self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send(GeminiStreamEvent::Error(e.to_string())).await;
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            let message = format!("{status}: {detail}");
            let _ = tx.send(GeminiStreamEvent::Error(message.clone())).await;
            return Err(Error::Streaming(message));
        }

        let mut stream = response.bytes_stream();
        // Chunks can split an event anywhere, including mid-codepoint, so
        // buffer raw bytes and decode only complete lines.
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    for line in drain_lines(&mut buffer) {
                        if let Some(text) = event_text(&line) {
                            let _ = tx.send(GeminiStreamEvent::Text(text)).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Stream error: {}", e);
                    let _ = tx.send(GeminiStreamEvent::Error(e.to_string())).await;
                    return Err(Error::Streaming(e.to_string()));
                }
            }
        }

        // Flush a final event that arrived without a trailing newline.
        let tail = String::from_utf8_lossy(&buffer);
        if let Some(text) = event_text(tail.trim_end_matches('\r')) {
            let _ = tx.send(GeminiStreamEvent::Text(text)).await;
        }

        let _ = tx.send(GeminiStreamEvent::End).await;
        Ok(())
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The credential stays out of all output.
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Split off every complete line, leaving any trailing partial in the
/// buffer. Splitting at `b'\n'` is codepoint-safe: that byte never occurs
/// inside a multi-byte UTF-8 sequence.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let rest = buffer.split_off(pos + 1);
        let mut line = std::mem::replace(buffer, rest);
        line.pop(); // the newline
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

/// Extract the text increment from one SSE line, if it carries one.
fn event_text(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<GenerateContentResponse>(payload) {
        Ok(event) => event.text(),
        Err(e) => {
            tracing::warn!("Failed to parse SSE line: {} - Error: {}", line, e);
            None
        }
    }
}

/// Build a `multipart/related` body: JSON metadata part, then the file bytes.
fn multipart_related_body(boundary: &str, display_name: &str, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let metadata = serde_json::json!({
        "file": { "displayName": display_name }
    });

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_text_parses_data_lines() {
        let line = r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"Article"}]}}]}"#;
        assert_eq!(event_text(line), Some("Article".to_string()));
    }

    #[test]
    fn test_event_text_ignores_non_data_lines() {
        assert_eq!(event_text(""), None);
        assert_eq!(event_text(": keep-alive"), None);
        assert_eq!(event_text("event: message"), None);
    }

    #[test]
    fn test_event_text_skips_malformed_json() {
        assert_eq!(event_text("data: {not json"), None);
    }

    #[test]
    fn test_event_text_skips_candidates_without_text() {
        let line = r#"data: {"candidates":[{"content":{"role":"model","parts":[]}}]}"#;
        assert_eq!(event_text(line), None);
    }

    #[test]
    fn test_drain_lines_keeps_trailing_partial() {
        let mut buffer = b"data: first\r\ndata: part".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, ["data: first"]);
        assert_eq!(buffer, b"data: part");
    }

    #[test]
    fn test_drain_lines_reassembles_split_multibyte_chars() {
        let event = format!(
            "data: {}\n",
            serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "a ₹500 fine"}]}}]
            })
        );
        // Cut inside the three-byte rupee sign, as a network chunk boundary may.
        let cut = event.find('₹').unwrap() + 1;

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&event.as_bytes()[..cut]);
        assert!(drain_lines(&mut buffer).is_empty());

        buffer.extend_from_slice(&event.as_bytes()[cut..]);
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines.len(), 1);
        assert_eq!(event_text(&lines[0]), Some("a ₹500 fine".to_string()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let event: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Article "},{"text":"21"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(event.text(), Some("Article 21".to_string()));
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_related_body("----b1", "law.pdf", "application/pdf", b"%PDF-1.4");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("------b1\r\n"));
        assert!(text.contains(r#""displayName":"law.pdf""#));
        assert!(text.contains("Content-Type: application/pdf"));
        assert!(text.contains("%PDF-1.4"));
        assert!(text.ends_with("------b1--\r\n"));
    }

    #[test]
    fn test_request_serialization_uses_wire_names() {
        let request = GenerateContentRequest {
            contents: vec![
                Content::file("application/pdf", "https://files/abc"),
                Content::user_text("hello"),
            ],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["fileData"]["fileUri"], "https://files/abc");
        assert_eq!(json["contents"][0]["parts"][0]["fileData"]["mimeType"], "application/pdf");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "hello");
        assert!(json["contents"][1]["parts"][0].get("fileData").is_none());
    }
}
