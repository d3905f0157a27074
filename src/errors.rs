//! Error taxonomy for storescope
//!
//! Error codes:
//! - SCOPE_NOT_FOUND (ERROR severity)
//! - SCOPE_ALREADY_EXISTS (ERROR severity)
//! - SCOPE_DECODE_ERROR (ERROR severity) - scoped to a single entry
//! - SCOPE_ENGINE_ERROR (FATAL severity)
//! - SCOPE_RESOURCE_ERROR (FATAL severity)
//!
//! NotFound and AlreadyExists are expected control-flow signals. Decode
//! errors are caught per entry during bulk scans. Engine and resource errors
//! abort the run once open sessions have been released.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::keystring::KeyStringError;

/// Severity levels for storescope errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails, the run continues
    Error,
    /// The run must abort
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Namespace, identity or key absent where required to exist
    NotFound,
    /// Namespace or identity already registered
    AlreadyExists,
    /// Malformed key/value bytes or key helper failure for one entry
    Decode,
    /// Underlying engine failure
    Engine,
    /// Session or cursor used after release
    Resource,
}

impl ErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "SCOPE_NOT_FOUND",
            ErrorCode::AlreadyExists => "SCOPE_ALREADY_EXISTS",
            ErrorCode::Decode => "SCOPE_DECODE_ERROR",
            ErrorCode::Engine => "SCOPE_ENGINE_ERROR",
            ErrorCode::Resource => "SCOPE_RESOURCE_ERROR",
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::NotFound | ErrorCode::AlreadyExists | ErrorCode::Decode => Severity::Error,
            ErrorCode::Engine | ErrorCode::Resource => Severity::Fatal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// storescope error with code, message and optional context
#[derive(Debug)]
pub struct InspectError {
    code: ErrorCode,
    message: String,
    details: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl InspectError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Namespace, identity or key absent
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Namespace or identity already registered
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    /// Malformed bytes for a single entry
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decode, message)
    }

    /// Engine failure without an underlying I/O error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Engine, message)
    }

    /// Engine failure caused by an I/O error
    pub fn engine_io(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(ErrorCode::Engine, message).with_source(source)
    }

    /// Session or cursor misuse
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Resource, message)
    }

    /// Attach details (identity, offset, key) to the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach an underlying cause
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error must abort the run
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.code == ErrorCode::AlreadyExists
    }

    pub fn is_decode(&self) -> bool {
        self.code == ErrorCode::Decode
    }

    pub fn is_engine(&self) -> bool {
        self.code == ErrorCode::Engine
    }

    pub fn is_resource(&self) -> bool {
        self.code == ErrorCode::Resource
    }
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl StdError for InspectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<KeyStringError> for InspectError {
    fn from(e: KeyStringError) -> Self {
        InspectError::decode(format!("keystring: {}", e))
    }
}

impl From<bson::de::Error> for InspectError {
    fn from(e: bson::de::Error) -> Self {
        InspectError::decode("invalid BSON document").with_source(e)
    }
}

impl From<bson::ser::Error> for InspectError {
    fn from(e: bson::ser::Error) -> Self {
        InspectError::decode("document cannot be encoded as BSON").with_source(e)
    }
}

/// Result type for storescope operations
pub type InspectResult<T> = Result<T, InspectError>;
