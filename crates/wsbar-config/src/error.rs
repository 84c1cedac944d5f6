use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(wsbar::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(wsbar::config::invalid))]
    Invalid { message: String },

    #[error("Invalid value for `{key}`: expected {expected}")]
    #[diagnostic(code(wsbar::config::invalid_value))]
    InvalidValue { key: String, expected: &'static str },

    #[error("Config file not found: {path}")]
    #[diagnostic(code(wsbar::config::not_found))]
    NotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
