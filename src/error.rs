// src/error.rs
//! Public error type for the entire crate

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdrError>;

/// Native status code as reported by the engine (`PORT_GetError()`).
///
/// Carried verbatim inside [`SdrError`]; never reinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    #[inline]
    pub fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error raised by a caller-supplied password resolver.
///
/// Kept boxed so the original value survives the trip through native code
/// and can be downcast back to its concrete type.
pub type ResolverError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum SdrError {
    #[error("base64 decoding failed (native error {code})")]
    DecodeFailed { input: Vec<u8>, code: ErrorCode },

    #[error("decryption failed (native error {code})")]
    DecryptFailed { input: Vec<u8>, code: ErrorCode },

    #[error("password resolver failed: {0}")]
    ResolverFailed(#[source] ResolverError),

    #[error("engine already initialized — shut it down first")]
    AlreadyInitialized,

    #[error("engine initialization failed for {} (native error {code})", .config_dir.display())]
    InitFailed { config_dir: PathBuf, code: ErrorCode },

    #[error("engine shutdown failed (native error {code})")]
    ShutdownFailed { code: ErrorCode },

    #[error("password contains an interior NUL byte")]
    PasswordContainsNul,

    #[error("plaintext is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("soft token error: {0}")]
    Token(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdrError {
    /// Native status code attached to this error, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SdrError::DecodeFailed { code, .. }
            | SdrError::DecryptFailed { code, .. }
            | SdrError::InitFailed { code, .. }
            | SdrError::ShutdownFailed { code } => Some(*code),
            _ => None,
        }
    }

    /// Encoded input that failed, for decode and decrypt failures
    pub fn input(&self) -> Option<&[u8]> {
        match self {
            SdrError::DecodeFailed { input, .. } | SdrError::DecryptFailed { input, .. } => {
                Some(input)
            }
            _ => None,
        }
    }

    pub fn is_decode_failure(&self) -> bool {
        matches!(self, SdrError::DecodeFailed { .. })
    }

    pub fn is_decrypt_failure(&self) -> bool {
        matches!(self, SdrError::DecryptFailed { .. })
    }

    pub fn is_resolver_failure(&self) -> bool {
        matches!(self, SdrError::ResolverFailed(_))
    }

    /// Consume the error and hand back the resolver's original error
    pub fn into_resolver_error(self) -> Option<ResolverError> {
        match self {
            SdrError::ResolverFailed(err) => Some(err),
            _ => None,
        }
    }
}
