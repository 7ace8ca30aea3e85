use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for the kernel
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum KernelError {
    /// Backend or routing failures in the persistency layer
    #[error("Persistency error: {0}")]
    Persistency(String),

    /// A local object that does not exist in any reader
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The item is held for writing by another transaction
    #[error("Item {item} is locked for writing by transaction {holder}")]
    Locked { item: String, holder: String },

    /// Data that does not satisfy the expected shape
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A cluster path that does not match its cluster type
    #[error("Invalid cluster path: {0}")]
    InvalidPath(String),

    /// XML/JSON marshalling errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors (file reading, etc.)
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed script definitions
    #[error("Script parsing error: {0}")]
    ScriptParsing(String),

    /// Errors raised while running a script
    #[error("Script execution error: {context}")]
    ScriptExecution {
        context: String,
        #[source]
        #[serde(skip)]
        source: Option<Box<KernelError>>,
    },

    /// No engine registered for a script language
    #[error("Script engine not found: {0}")]
    EngineNotFound(String),

    /// Missing or mistyped script parameters
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Invalid kernel configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl KernelError {
    /// Creates a new script execution error with context
    pub fn script_execution<S: Into<String>>(context: S, source: Option<KernelError>) -> Self {
        KernelError::ScriptExecution {
            context: context.into(),
            source: source.map(Box::new),
        }
    }

    /// Creates a new lock conflict error
    pub fn locked(item: impl fmt::Display, holder: impl fmt::Display) -> Self {
        KernelError::Locked {
            item: item.to_string(),
            holder: holder.to_string(),
        }
    }

    /// Convert from std::io::Error
    pub fn from_io(err: std::io::Error) -> Self {
        KernelError::Io(err.to_string())
    }

    /// Convert from serde_json::Error
    pub fn from_serde(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }

    /// Convert from a quick-xml deserialization error
    pub fn from_xml_de(err: impl fmt::Display) -> Self {
        KernelError::Serialization(format!("Failed to parse XML: {}", err))
    }

    /// Convert from a quick-xml serialization error
    pub fn from_xml_se(err: impl fmt::Display) -> Self {
        KernelError::Serialization(format!("Failed to write XML: {}", err))
    }

    /// Determines if this error is retryable (worth retrying)
    ///
    /// Lock conflicts and I/O hiccups are transient; everything else describes bad data,
    /// bad scripts or bad configuration and fails the same way on every attempt.
    pub fn retryable(&self) -> bool {
        match self {
            KernelError::Locked { .. } => true,
            KernelError::Io(_) => true,
            KernelError::Timeout(_) => true,
            KernelError::ScriptExecution { source, .. } => {
                source.as_ref().map(|e| e.retryable()).unwrap_or(false)
            }

            KernelError::Persistency(_) => false,
            KernelError::ObjectNotFound(_) => false,
            KernelError::InvalidData(_) => false,
            KernelError::InvalidPath(_) => false,
            KernelError::Serialization(_) => false,
            KernelError::ScriptParsing(_) => false,
            KernelError::EngineNotFound(_) => false,
            KernelError::Parameter(_) => false,
            KernelError::Configuration(_) => false,
        }
    }

    /// Short machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            KernelError::Persistency(_) => "PERSISTENCY_ERROR",
            KernelError::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            KernelError::Locked { .. } => "LOCKED",
            KernelError::InvalidData(_) => "INVALID_DATA",
            KernelError::InvalidPath(_) => "INVALID_PATH",
            KernelError::Serialization(_) => "SERIALIZATION_ERROR",
            KernelError::Io(_) => "IO_ERROR",
            KernelError::ScriptParsing(_) => "SCRIPT_PARSING_ERROR",
            KernelError::ScriptExecution { .. } => "SCRIPT_ERROR",
            KernelError::EngineNotFound(_) => "ENGINE_NOT_FOUND",
            KernelError::Parameter(_) => "PARAMETER_ERROR",
            KernelError::Timeout(_) => "TIMEOUT_ERROR",
            KernelError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Type alias for Result with KernelError
pub type Result<T> = std::result::Result<T, KernelError>;

/// Error report produced by business-logic scripts
///
/// Scripts accumulate messages while validating; a fatal report aborts the script
/// execution that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Whether the reported problems must stop the caller
    #[serde(default)]
    pub fatal: bool,

    /// Human-readable messages, in the order they were reported
    #[serde(default)]
    pub messages: Vec<String>,
}

impl ErrorInfo {
    /// Create an empty, non-fatal report
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a report holding a single message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            fatal: false,
            messages: vec![message.into()],
        }
    }

    /// Append a message
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Flag the report as fatal
    pub fn set_fatal(&mut self) {
        self.fatal = true;
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join("\n"))
    }
}

impl From<KernelError> for ErrorInfo {
    fn from(error: KernelError) -> Self {
        Self {
            fatal: true,
            messages: vec![error.to_string()],
        }
    }
}
