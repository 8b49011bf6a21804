// error.rs - Idiomatic Rust error types for rosella.
//
// Groups the C-style i32 status codes into semantic variants while
// preserving the original code for interop. Semantic outcomes (compile
// rejected, load rejected, no match) are NOT errors; they travel as
// ok-flags and diagnostic messages alongside Ok results.

use std::fmt;

use crate::rosie::*;

/// Error type for engine, compile, match, trace and load operations.
#[derive(Debug)]
pub enum RosieError {
    /// Engine initialization failed. Carries the diagnostic text, or the
    /// generic fallback when the engine produced none.
    Initialization { message: String },
    /// Allocation failed, or the soft allocation ceiling was exceeded.
    OutOfMemory,
    /// An OS-level operation failed.
    Syscall { message: String },
    /// The engine call itself failed.
    EngineCallFailed { message: String },
    /// The pattern id names no live compiled pattern (freed, never
    /// compiled, or belonging to another engine).
    NoPattern,
    /// Unknown output encoder or trace style name.
    NoEncoder,
    /// An argument was rejected before reaching the engine, e.g. an
    /// allocation limit below the minimum or a start position of 0.
    InvalidArgument { message: String },
    /// A diagnostic or configuration payload could not be decoded into
    /// structured form. Distinct from a failed call by design.
    Decode { message: String },
    /// Status code with no specific mapping.
    Other(i32),
}

impl fmt::Display for RosieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosieError::Initialization { message } => write!(f, "{}", message),
            RosieError::OutOfMemory => write!(f, "out of memory"),
            RosieError::Syscall { message } => write!(f, "system call failed: {}", message),
            RosieError::EngineCallFailed { message } => write!(f, "engine call failed: {}", message),
            RosieError::NoPattern => write!(f, "invalid compiled pattern"),
            RosieError::NoEncoder => write!(f, "invalid encoder or trace style"),
            RosieError::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            RosieError::Decode { message } => write!(f, "could not decode payload: {}", message),
            RosieError::Other(code) => write!(f, "error code {}", code),
        }
    }
}

impl std::error::Error for RosieError {}

impl From<i32> for RosieError {
    fn from(code: i32) -> Self {
        match code {
            ERR_OUT_OF_MEMORY => RosieError::OutOfMemory,
            ERR_SYSCALL_FAILED => RosieError::Syscall {
                message: "see engine log".to_string(),
            },
            ERR_ENGINE_CALL_FAILED => RosieError::EngineCallFailed {
                message: "engine call failed".to_string(),
            },
            _ => RosieError::Other(code),
        }
    }
}

impl From<serde_json::Error> for RosieError {
    fn from(err: serde_json::Error) -> Self {
        RosieError::Decode {
            message: err.to_string(),
        }
    }
}

impl RosieError {
    /// Returns the original C status code, if applicable.
    pub fn code(&self) -> i32 {
        match self {
            RosieError::Initialization { .. } => ERR_ENGINE_CALL_FAILED,
            RosieError::OutOfMemory => ERR_OUT_OF_MEMORY,
            RosieError::Syscall { .. } => ERR_SYSCALL_FAILED,
            RosieError::EngineCallFailed { .. } => ERR_ENGINE_CALL_FAILED,
            RosieError::NoPattern => ERR_ENGINE_CALL_FAILED,
            RosieError::NoEncoder => ERR_ENGINE_CALL_FAILED,
            RosieError::InvalidArgument { .. } => ERR_ENGINE_CALL_FAILED,
            RosieError::Decode { .. } => ERR_ENGINE_CALL_FAILED,
            RosieError::Other(code) => *code,
        }
    }
}
