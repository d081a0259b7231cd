// Constants, potentially loaded from environment or config files.

use std::env;

/// The instruction seeded as the first message of every chat session.
pub const SYSTEM_PROMPT: &str = "You are a friendly, experienced constitutional lawyer. \
You are speaking to a client who has little legal knowledge. \
Answer me straight and don't include unnecessary legal jargon. \
Your job is to explain answers in clear, simple language, while telling me what I can do to get help. \
Ask relevant questions to understand the user's needs better.";

// Use lazy_static to initialize static variables safely.
lazy_static::lazy_static! {
    // Overridable so tests and local proxies can redirect the client.
    pub static ref GEMINI_BASE_URL: String = env::var("COUNSEL_GEMINI_BASE_URL")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
}
