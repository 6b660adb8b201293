//! Error taxonomy and process exit codes.

use std::io;
use thiserror::Error;

/// Process exit codes fixed by the command-line contract.
pub mod exit_code {
    /// Transfer completed, both workers succeeded.
    pub const SUCCESS: u8 = 0;
    /// The input worker failed to read from its endpoint.
    pub const INPUT_FAILED: u8 = 10;
    /// The output worker failed to write to its endpoint.
    pub const OUTPUT_FAILED: u8 = 11;
    /// A worker hit an internal logic error (a violated precondition).
    pub const LOGIC_ERROR: u8 = 19;
    /// A worker died without reporting a result.
    pub const UNKNOWN: u8 = 28;
    /// Setup failed before the transfer started.
    pub const RUNTIME: u8 = 29;
    /// Usage text was printed because no endpoints were supplied.
    pub const USAGE: u8 = 48;
    /// The command line could not be parsed.
    pub const SYNTAX: u8 = 49;
}

/// A command-line syntax error. Maps to exit code 49.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SyntaxError(pub String);

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A failed endpoint operation.
///
/// Workers map these onto their result code (10 for the input side, 11 for
/// the output side); the error itself does not know which side it came from.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// An OS-level I/O failure with the context of the failed operation.
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: io::Error,
    },

    /// An endpoint contract violation with no underlying OS error.
    #[error("{0}")]
    Failed(String),
}

impl EndpointError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors surfaced by setup, before the worker threads start.
#[derive(Debug, Error)]
pub enum Error {
    /// The command line (or an endpoint specification) is malformed.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Endpoint construction failed (name resolution, thread spawn, ...).
    #[error("{0}")]
    Runtime(String),
}

impl Error {
    /// The exit code mandated for this error class.
    #[inline]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Syntax(_) => exit_code::SYNTAX,
            Self::Runtime(_) => exit_code::RUNTIME,
        }
    }
}
