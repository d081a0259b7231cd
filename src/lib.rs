//! PDF-grounded legal chat assistant.
//!
//! Uploads one PDF to the Gemini API at startup, then serves a browser chat
//! widget that streams the model's replies as cumulative text snapshots.

pub mod config;
pub mod constants;
pub mod error;
pub mod gemini;
pub mod relay;
pub mod session;
pub mod web_server;

pub use error::Error;
