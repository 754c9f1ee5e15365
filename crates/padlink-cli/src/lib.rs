//! padlink - command-line tools for pad sessions
//!
//! This crate provides:
//! - Offline inspection of captured packets and button-status payloads
//! - A simulated session run against one or two virtual pads

#![forbid(unsafe_code)]

pub mod cli;
pub mod inspect;
pub mod output;
pub mod simulate;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use padlink_core::{HandshakeError, ManagerError, SessionError};

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Authentication failed (bad tag or unusable peer key)
/// - 3: Timeout
/// - 4: Connection failed
/// - 5: Invalid input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    AuthenticationFailed = 2,
    Timeout = 3,
    ConnectionFailed = 4,
    InvalidInput = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::AuthenticationFailed => "AUTH_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::AuthenticationFailed => "Authentication or key agreement failed",
            ExitCode::Timeout => "Operation timed out",
            ExitCode::ConnectionFailed => "Could not establish or keep the connection",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
        }
    }

    /// Pick the exit code for a failed connect.
    pub fn for_manager_error(err: &ManagerError) -> Self {
        match err {
            ManagerError::SlotOccupied(_) | ManagerError::DuplicatePeripheral(_) => {
                ExitCode::InvalidInput
            }
            ManagerError::Session(SessionError::InvalidState { .. }) => ExitCode::GeneralError,
            ManagerError::Session(SessionError::Transport(_)) => ExitCode::ConnectionFailed,
            ManagerError::Session(SessionError::Handshake(e)) => Self::for_handshake_error(e),
        }
    }

    fn for_handshake_error(err: &HandshakeError) -> Self {
        match err {
            HandshakeError::Timeout(_) => ExitCode::Timeout,
            HandshakeError::MalformedResponse(_) => ExitCode::AuthenticationFailed,
            HandshakeError::KeyDerivation(_) => ExitCode::GeneralError,
            HandshakeError::Cancelled => ExitCode::GeneralError,
            HandshakeError::Transport(_) => ExitCode::ConnectionFailed,
        }
    }
}
