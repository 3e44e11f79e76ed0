//! Bridge error types

use crate::ports::{NetworkError, StorageError};
use rhai::{Dynamic, EvalAltResult, ParseError, Position};

/// Bridge result type
pub type Result<T, E = ScriptError> = std::result::Result<T, E>;

/// Errors surfaced by the engine to host code
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script runtime could not be brought up
    #[error("Engine initialization failed: {message}")]
    Initialization {
        /// Error message
        message: String,
    },

    /// Script source failed to parse
    #[error("Script compilation error: {message}{}", location(.source_name, .line, .column))]
    Compilation {
        /// Error message
        message: String,
        /// File name passed to `evaluate`, if any
        source_name: Option<String>,
        /// Line number if available
        line: Option<usize>,
        /// Column number if available
        column: Option<usize>,
    },

    /// Uncaught exception raised while running a script
    #[error("Script runtime error: {message}{}", location(.source_name, .line, .column))]
    Runtime {
        /// Error message
        message: String,
        /// File name passed to `evaluate`, if any
        source_name: Option<String>,
        /// Line number if available
        line: Option<usize>,
        /// Column number if available
        column: Option<usize>,
    },

    /// A value was narrowed to a type it does not hold
    #[error("Script type error: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Requested type
        expected: &'static str,
        /// Type actually held by the value
        actual: String,
    },

    /// The engine that produced a value has been dropped
    #[error("The engine owning this value has been dropped")]
    EngineDropped,

    /// A native callback reported failure
    #[error("Callback error: {message}")]
    Callback {
        /// Error message
        message: String,
    },

    /// Value could not be converted to or from a host representation
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Engine options could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Storage port failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Network port failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn location(source_name: &Option<String>, line: &Option<usize>, column: &Option<usize>) -> String {
    let mut out = String::new();
    if let Some(name) = source_name {
        out.push_str(&format!(" in '{name}'"));
    }
    if let Some(line) = line {
        out.push_str(&format!(" at line {line}"));
        if let Some(column) = column {
            out.push_str(&format!(", column {column}"));
        }
    }
    out
}

impl ScriptError {
    /// Create an initialization error
    pub fn initialization<S: Into<String>>(message: S) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create a runtime error without location
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::Runtime {
            message: message.into(),
            source_name: None,
            line: None,
            column: None,
        }
    }

    /// Create a callback error
    pub fn callback<S: Into<String>>(message: S) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn type_mismatch(expected: &'static str, actual: &str) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.to_string(),
        }
    }

    /// Whether this error came out of the script itself (parse failure or
    /// uncaught exception)
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Compilation { .. } | Self::Runtime { .. })
    }

    /// Line the script error points at, if known
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Compilation { line, .. } | Self::Runtime { line, .. } => *line,
            _ => None,
        }
    }

    /// File name the failing script was evaluated under, if any
    pub fn source_name(&self) -> Option<&str> {
        match self {
            Self::Compilation { source_name, .. } | Self::Runtime { source_name, .. } => {
                source_name.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn from_parse_error(err: &ParseError, source_name: Option<&str>) -> Self {
        let pos = err.position();
        Self::Compilation {
            message: err.err_type().to_string(),
            source_name: source_name.map(str::to_string),
            line: pos.line(),
            column: pos.position(),
        }
    }

    pub(crate) fn from_eval_error(mut err: EvalAltResult, source_name: Option<&str>) -> Self {
        if let EvalAltResult::ErrorParsing(ref kind, pos) = err {
            return Self::Compilation {
                message: kind.to_string(),
                source_name: source_name.map(str::to_string),
                line: pos.line(),
                column: pos.position(),
            };
        }

        let pos = err.take_position();
        Self::Runtime {
            message: err.to_string(),
            source_name: source_name.map(str::to_string),
            line: pos.line(),
            column: pos.position(),
        }
    }

    /// Convert into an exception raised inside the script runtime
    pub(crate) fn into_eval_error(self) -> Box<EvalAltResult> {
        runtime_error(self.to_string())
    }
}

/// Build a script-level exception carrying `message`
pub(crate) fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(message.into()), Position::NONE).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = ScriptError::Runtime {
            message: "boom".to_string(),
            source_name: Some("rules.rhai".to_string()),
            line: Some(3),
            column: Some(7),
        };
        assert_eq!(
            err.to_string(),
            "Script runtime error: boom in 'rules.rhai' at line 3, column 7"
        );
        assert!(err.is_script_error());
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.source_name(), Some("rules.rhai"));
    }

    #[test]
    fn test_error_without_location() {
        let err = ScriptError::runtime("boom");
        assert_eq!(err.to_string(), "Script runtime error: boom");
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_non_script_errors() {
        assert!(!ScriptError::callback("bad input").is_script_error());
        assert!(!ScriptError::EngineDropped.is_script_error());
        let err = ScriptError::type_mismatch("string", "i64");
        assert_eq!(err.to_string(), "Script type error: expected string, found i64");
    }

    #[test]
    fn test_parse_error_conversion() {
        let engine = rhai::Engine::new();
        let err = engine.compile("let x = ;").unwrap_err();
        let converted = ScriptError::from_parse_error(&err, Some("bad.rhai"));
        assert!(matches!(converted, ScriptError::Compilation { .. }));
        assert_eq!(converted.line(), Some(1));
        assert_eq!(converted.source_name(), Some("bad.rhai"));
    }

    #[test]
    fn test_eval_error_conversion() {
        let engine = rhai::Engine::new();
        let err = engine.eval::<rhai::Dynamic>("throw \"nope\"").unwrap_err();
        let converted = ScriptError::from_eval_error(*err, None);
        assert!(matches!(converted, ScriptError::Runtime { .. }));
        assert!(converted.to_string().contains("nope"));
        assert_eq!(converted.line(), Some(1));
    }
}
