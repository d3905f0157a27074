//! CLI-specific error types
//!
//! Each code maps to a process exit status so scripts can tell a bad
//! invocation from an unreadable data directory.

use std::fmt;
use std::io;

use crate::errors::InspectError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Config file missing, unparsable or invalid
    ConfigError,
    /// Malformed namespace or argument
    UsageError,
    /// Writing to stdout failed
    IoError,
    /// Connection to the data directory failed
    BootFailed,
    /// An operation failed after the connection was open
    CommandFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SCOPE_CLI_CONFIG_ERROR",
            Self::UsageError => "SCOPE_CLI_USAGE_ERROR",
            Self::IoError => "SCOPE_CLI_IO_ERROR",
            Self::BootFailed => "SCOPE_CLI_BOOT_FAILED",
            Self::CommandFailed => "SCOPE_CLI_COMMAND_FAILED",
        }
    }

    pub fn exit_status(&self) -> i32 {
        match self {
            Self::CommandFailed => 1,
            Self::UsageError => 2,
            Self::ConfigError => 3,
            Self::BootFailed => 4,
            Self::IoError => 5,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
    /// Code of the storage error behind a `CommandFailed`
    cause: Option<&'static str>,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn usage_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::UsageError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `SCOPE_*` code of the underlying storage error, if any
    pub fn cause(&self) -> Option<&'static str> {
        self.cause
    }

    pub fn exit_status(&self) -> i32 {
        self.code.exit_status()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(format!("failed to write output: {}", e))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("failed to render JSON output: {}", e))
    }
}

impl From<InspectError> for CliError {
    fn from(e: InspectError) -> Self {
        Self {
            code: CliErrorCode::CommandFailed,
            message: e.to_string(),
            cause: Some(e.code().code()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_keep_their_code() {
        let err = CliError::from(InspectError::not_found("namespace not found"));
        assert_eq!(err.code(), &CliErrorCode::CommandFailed);
        assert_eq!(err.cause(), Some("SCOPE_NOT_FOUND"));
        assert_eq!(err.exit_status(), 1);
        assert!(err.to_string().starts_with("SCOPE_CLI_COMMAND_FAILED: "));
    }

    #[test]
    fn test_exit_statuses_are_distinct() {
        let codes = [
            CliErrorCode::ConfigError,
            CliErrorCode::UsageError,
            CliErrorCode::IoError,
            CliErrorCode::BootFailed,
            CliErrorCode::CommandFailed,
        ];
        let mut statuses: Vec<i32> = codes.iter().map(CliErrorCode::exit_status).collect();
        statuses.sort();
        statuses.dedup();
        assert_eq!(statuses.len(), codes.len());
        assert!(CliError::usage_error("x").cause().is_none());
    }
}
