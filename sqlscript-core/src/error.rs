//! Error types with credential sanitization.
//!
//! Every failure of a run maps to one [`GenerateScriptError`] variant and a
//! distinct process exit code. Connection strings only ever appear in
//! messages after passing through [`redact_connection_string`].

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for script generation.
///
/// # Security
/// Passwords are never included in error output.
#[derive(Debug, Error)]
pub enum GenerateScriptError {
    /// Wrong command-line arguments
    #[error("{message}")]
    Usage { message: String },

    /// Connection could not be opened or the database resolved
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Catalog could not be read
    #[error("Object enumeration failed: {context}")]
    Enumeration {
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The scripting engine could not script an object
    #[error("Script generation failed: {context}")]
    ScriptGeneration {
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration or environment setup error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Convenience type alias for Results with GenerateScriptError
pub type Result<T> = std::result::Result<T, GenerateScriptError>;

impl GenerateScriptError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a connection error wrapping the driver error
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a connection error without an underlying cause
    pub fn connection(context: impl Into<String>) -> Self {
        Self::Connection {
            context: context.into(),
            source: None,
        }
    }

    pub fn enumeration_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Enumeration {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    pub fn enumeration(context: impl Into<String>) -> Self {
        Self::Enumeration {
            context: context.into(),
            source: None,
        }
    }

    pub fn script_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ScriptGeneration {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    pub fn script(context: impl Into<String>) -> Self {
        Self::ScriptGeneration {
            context: context.into(),
            source: None,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage { .. } => 1,
            Self::Connection { .. } => 2,
            Self::Enumeration { .. } => 3,
            Self::ScriptGeneration { .. } => 4,
            Self::Io { .. } => 5,
            Self::Configuration { .. } => 6,
        }
    }
}

/// Masks password values in an ADO.NET-style connection string.
///
/// Both `Password=` and `Pwd=` keys are recognized, quoted or not.
///
/// # Example
///
/// ```rust
/// use sqlscript_core::error::redact_connection_string;
///
/// let sanitized = redact_connection_string("server=.;user=sa;password=secret");
/// assert_eq!(sanitized, "server=.;user=sa;password=****");
/// ```
pub fn redact_connection_string(connection_string: &str) -> String {
    static PASSWORD: OnceLock<Option<Regex>> = OnceLock::new();

    let pattern = PASSWORD.get_or_init(|| {
        Regex::new(r#"(?i)\b(password|pwd)(\s*=\s*)("[^"]*"|'[^']*'|\{[^}]*\}|[^;]*)"#).ok()
    });

    match pattern {
        Some(pattern) => pattern
            .replace_all(connection_string, "${1}${2}****")
            .into_owned(),
        None => "<redacted>".to_string(),
    }
}
