use std::path::PathBuf;

/// Error taxonomy for the chat service.
///
/// The first three variants are fatal at startup; `Streaming` surfaces to the
/// connected client and the process keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    #[error("upload rejected by the Gemini API: {0}")]
    Upload(String),

    #[error("streaming reply failed: {0}")]
    Streaming(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed API payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_display_carries_failure_class() {
        let err = Error::Configuration("GOOGLE_API_KEY not found".to_string());
        assert!(err.to_string().contains("configuration error"));

        let err = Error::ResourceNotFound(Path::new("/no/such/document.pdf").to_path_buf());
        assert_eq!(
            err.to_string(),
            "resource not found: /no/such/document.pdf"
        );

        let err = Error::Upload("403 Forbidden".to_string());
        assert!(err.to_string().contains("upload rejected"));

        let err = Error::Streaming("connection reset".to_string());
        assert!(err.to_string().contains("streaming reply failed"));
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
