//! Shared error types

use thiserror::Error;

/// Errors common to configuration and store loading.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias using the shared Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = Error::Config("admin_addr must differ from listen_addr".into());
        assert_eq!(
            err.to_string(),
            "configuration error: admin_addr must differ from listen_addr"
        );

        let io = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(io.to_string().starts_with("I/O error:"), "got: {io}");
    }

    #[test]
    fn json_errors_convert() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(
            err.to_string().starts_with("JSON error:"),
            "got: {err}"
        );
    }

    #[test]
    fn debug_names_the_variant() {
        let err = Error::Config("bad port".into());
        let debug = format!("{err:?}");
        assert!(debug.contains("Config"), "got: {debug}");
    }
}
