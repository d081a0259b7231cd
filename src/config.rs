use crate::error::Error;

/// Environment variable holding the Gemini API credential.
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

/// Read the API credential from the environment.
///
/// The key is held in memory only and must never be logged. A missing or
/// empty value halts startup before any other work happens.
pub fn api_key() -> Result<String, Error> {
    match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::Configuration(format!(
            "{API_KEY_VAR} not found; add it to .env or the environment"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the env mutations can't race each other.
    #[test]
    fn test_api_key_presence() {
        std::env::remove_var(API_KEY_VAR);
        assert!(matches!(api_key(), Err(Error::Configuration(_))));

        std::env::set_var(API_KEY_VAR, "  ");
        assert!(matches!(api_key(), Err(Error::Configuration(_))));

        std::env::set_var(API_KEY_VAR, "k1");
        assert_eq!(api_key().unwrap(), "k1");

        std::env::remove_var(API_KEY_VAR);
    }
}
