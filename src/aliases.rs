// src/aliases.rs
//! Re-exports secure-gate's secret wrappers
//!
//! These are the canonical secret types used throughout pwdecrypt. All of
//! them zero their contents on drop and only hand out the inner value via
//! `expose_secret()`.

pub use secure_gate::{dynamic_alias, fixed_alias};

// Dynamic secrets
dynamic_alias!(Password, String); // token login password
dynamic_alias!(Plaintext, Vec<u8>); // decrypted SDR payload, caller-owned copy

// Fixed-size secrets
fixed_alias!(TokenKey64, 64); // PBKDF2 output: AES-256 key ‖ HMAC-SHA256 key
