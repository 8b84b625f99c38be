// SPDX-License-Identifier: BUSL-1.1
// Copyright 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes returned by the management endpoint, shared across
/// its gRPC responses and the CLI's usage-error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    NotFound,
    ValidationFailed,
    ReloadFailed,
    Internal,
}

impl ErrorCode {
    pub fn grpc_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHENTICATED",
            Self::BadRequest => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationFailed => "FAILED_PRECONDITION",
            Self::ReloadFailed => "ABORTED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ReloadFailed => "RELOAD_FAILED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Convert this error code into a [`tonic::Status`] with the given message.
    pub fn to_grpc_status(&self, message: impl Into<String>) -> tonic::Status {
        let code = match self {
            Self::Unauthorized => tonic::Code::Unauthenticated,
            Self::BadRequest => tonic::Code::InvalidArgument,
            Self::NotFound => tonic::Code::NotFound,
            Self::ValidationFailed => tonic::Code::FailedPrecondition,
            Self::ReloadFailed => tonic::Code::Aborted,
            Self::Internal => tonic::Code::Internal,
        };
        tonic::Status::new(code, message)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal startup errors that exit the process nonzero before any subsystem
/// starts (spec exit code 2).
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot open buffer directory {path}: {source}")]
    Buffer { path: String, #[source] source: std::io::Error },
    #[error("cannot bind {what} on {addr}: {source}")]
    Bind { what: &'static str, addr: String, #[source] source: std::io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_code_matches_status_code() {
        assert_eq!(ErrorCode::Unauthorized.to_grpc_status("x").code(), tonic::Code::Unauthenticated);
        assert_eq!(ErrorCode::NotFound.to_grpc_status("x").code(), tonic::Code::NotFound);
    }

    #[test]
    fn display_uses_as_str() {
        assert_eq!(ErrorCode::Internal.to_string(), "INTERNAL");
    }
}
