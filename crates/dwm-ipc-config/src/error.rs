use miette::Diagnostic;
use thiserror::Error;

/// Position of a node or entry in the configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
    pub offset: usize,
    pub len: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize, len: usize) -> Self {
        Self {
            line,
            column,
            offset,
            len,
        }
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(dwm_ipc::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid value for `{node}` at line {}, column {}: {message}", location.line, location.column)]
    #[diagnostic(code(dwm_ipc::config::invalid_value))]
    InvalidValue {
        node: String,
        message: String,
        location: SourceLocation,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(dwm_ipc::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(dwm_ipc::config::missing_field))]
    MissingField { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
