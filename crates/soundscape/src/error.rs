//! Error types for Soundscape
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the soundscape engine
#[derive(Error, Debug)]
pub enum SoundscapeError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    /// The audio output could not be opened or resumed
    #[error("Audio graph unavailable: {0}")]
    GraphUnavailable(String),

    /// A graph operation was refused (e.g. a second concurrent source)
    #[error("Audio graph error: {0}")]
    Graph(String),

    /// The procedural generator could not produce a buffer
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// A remote asset is missing or could not be fetched
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine has been disposed")]
    Disposed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Soundscape
pub type Result<T> = std::result::Result<T, SoundscapeError>;

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_status() {
        if let Some(status) = e.status() {
            return format!("Server responded with {status}");
        }
    }
    format!("Network error: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_unavailable_message() {
        let err = SoundscapeError::GraphUnavailable("no output device".into());
        assert_eq!(err.to_string(), "Audio graph unavailable: no output device");
    }

    #[test]
    fn disposed_message() {
        assert_eq!(
            SoundscapeError::Disposed.to_string(),
            "Engine has been disposed"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SoundscapeError = io.into();
        assert!(matches!(err, SoundscapeError::Io(_)));
    }

    #[test]
    fn json_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SoundscapeError = parse.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
