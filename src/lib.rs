// src/lib.rs
//! pwdecrypt — password-protected secret (SDR) decryption
//!
//! Features:
//! - Static-password and interactive (retry-capable) decryption
//! - Resolver errors and panics tunnelled losslessly through the native callback
//! - Native buffers released and zeroed on every exit path
//! - Pure-Rust software token, or the system NSS libraries (`nss` feature)

pub mod aliases;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod native;
pub mod session;
pub mod tty;

// Re-export everything users need at the crate root
pub use aliases::{Password, Plaintext};
pub use bridge::{PasswordBridge, PasswordSource};
pub use config::load as load_config;
pub use engine::EngineHandle;
pub use error::{ErrorCode, ResolverError, Result, SdrError};
pub use native::{SecurityEngine, SoftEngine, SoftToken};
pub use session::{decrypt, decrypt_interactive, decrypt_str, DecryptionSession, SessionState};
