// src/consts.rs
//! Shared constants — native status codes, soft token parameters, defaults

use crate::error::ErrorCode;

// ─────────────────────────────────────────────────────────────────────────────
// Native status codes (NSS `secerr.h`, SEC_ERROR_BASE = -0x2000)
// ─────────────────────────────────────────────────────────────────────────────

/// No error was recorded by the native side
pub const NO_ERROR: ErrorCode = ErrorCode(0);

pub const SEC_ERROR_IO: ErrorCode = ErrorCode(-8192);
pub const SEC_ERROR_LIBRARY_FAILURE: ErrorCode = ErrorCode(-8191);
pub const SEC_ERROR_BAD_DATA: ErrorCode = ErrorCode(-8190);
pub const SEC_ERROR_INVALID_ARGS: ErrorCode = ErrorCode(-8187);
pub const SEC_ERROR_BAD_PASSWORD: ErrorCode = ErrorCode(-8177);
pub const SEC_ERROR_BAD_DATABASE: ErrorCode = ErrorCode(-8174);
pub const SEC_ERROR_NO_MEMORY: ErrorCode = ErrorCode(-8173);
pub const SEC_ERROR_BUSY: ErrorCode = ErrorCode(-8053);
pub const SEC_ERROR_NOT_INITIALIZED: ErrorCode = ErrorCode(-8038);

// ─────────────────────────────────────────────────────────────────────────────
// Soft token
// ─────────────────────────────────────────────────────────────────────────────

/// Key store file inside the profile directory
pub const SOFT_TOKEN_FILE: &str = "softtoken.toml";

/// Current key store layout
pub const SOFT_TOKEN_VERSION: u32 = 1;

/// Magic prefix of every soft token SDR blob
pub const SDR_MAGIC: &[u8; 4] = b"SDR1";

/// PBKDF2-HMAC-SHA256 rounds for newly provisioned tokens
// ~0.1s on modern hardware
pub const DEFAULT_TOKEN_KDF_ITERATIONS: u32 = 210_000;

/// Label authenticated under the MAC key to verify a login password
pub const PASSWORD_CHECK_LABEL: &[u8] = b"pwdecrypt soft token password check";

pub const AES_BLOCK_LEN: usize = 16;
pub const HMAC_TAG_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Env var naming the TOML config file
pub const CONFIG_ENV: &str = "PWDECRYPT_CONFIG";

/// Env var overriding the profile (key database) directory
pub const PROFILE_DIR_ENV: &str = "PWDECRYPT_PROFILE_DIR";

/// Config file looked up in the working directory when `PWDECRYPT_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "pwdecrypt.toml";

/// Default NSS shared database location, relative to `$HOME`
pub const DEFAULT_PROFILE_SUBDIR: &str = ".pki/nssdb";
