//! Turns one user message into a stream of ever-growing reply snapshots.
//!
//! Each `submit` call appends the user message, sends the document handle
//! plus the full conversation to the Gemini API, and forwards the cumulative
//! reply text (never deltas) after every increment. On a clean finish the
//! final reply is appended as an assistant message; on a mid-stream failure
//! the partial reply is dropped and the session stays usable.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::error;

use crate::gemini::{
    Content, DocumentHandle, GeminiClient, GeminiStreamEvent, GenerateContentRequest,
};
use crate::session::{ChatMessage, ChatSession, Role};

/// Events observed by the caller of [`Relay::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The cumulative reply so far. Each snapshot is a prefix-extension of
    /// the previous one.
    Snapshot(String),
    /// The stream finished; carries the final full reply.
    Done(String),
    /// The stream failed mid-reply. The partial text was not saved.
    Error(String),
}

/// One conversation's bridge between the session log and the Gemini API.
#[derive(Debug)]
pub struct Relay {
    client: Arc<GeminiClient>,
    model: String,
    document: Arc<DocumentHandle>,
    session: Arc<Mutex<ChatSession>>,
}

impl Relay {
    pub fn new(
        client: Arc<GeminiClient>,
        model: impl Into<String>,
        document: Arc<DocumentHandle>,
        session: ChatSession,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            document,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// A stable copy of the underlying conversation log.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.session.lock().await.snapshot()
    }

    /// Start a new chat turn.
    ///
    /// The returned channel yields a finite, single-use sequence ending in
    /// either `Done` or `Error`. The stream runs to completion even if the
    /// receiver is dropped; there is no cancellation and no retry.
    pub async fn submit(&self, user_text: impl Into<String>) -> mpsc::Receiver<RelayEvent> {
        let contents = {
            let mut session = self.session.lock().await;
            session.append(Role::User, user_text.into());
            build_contents(&self.document, &session.snapshot())
        };
        let request = GenerateContentRequest { contents };

        let (tx, rx) = mpsc::channel(32);
        let client = self.client.clone();
        let model = self.model.clone();
        let session = self.session.clone();

        tokio::spawn(async move {
            let (chunk_tx, mut chunk_rx) = mpsc::channel(32);
            let call = tokio::spawn(async move {
                client.stream_generate(&model, request, chunk_tx).await
            });

            let mut reply = String::new();
            while let Some(event) = chunk_rx.recv().await {
                match event {
                    GeminiStreamEvent::Text(chunk) => {
                        reply.push_str(&chunk);
                        // Receiver may be gone; the turn still completes.
                        let _ = tx.send(RelayEvent::Snapshot(reply.clone())).await;
                    }
                    GeminiStreamEvent::End => {
                        session.lock().await.append(Role::Assistant, reply.clone());
                        let _ = tx.send(RelayEvent::Done(reply)).await;
                        break;
                    }
                    GeminiStreamEvent::Error(message) => {
                        error!("streaming reply failed: {}", message);
                        let _ = tx.send(RelayEvent::Error(message)).await;
                        break;
                    }
                }
            }
            let _ = call.await;
        });

        rx
    }
}

/// Assemble the request payload: the document first, then the content of
/// every logged message in insertion order (system message included).
fn build_contents(document: &DocumentHandle, messages: &[ChatMessage]) -> Vec<Content> {
    let mut contents = Vec::with_capacity(messages.len() + 1);
    contents.push(Content::file(&document.mime_type, &document.uri));
    contents.extend(messages.iter().map(|m| Content::user_text(&m.content)));
    contents
}
