// src/config/defaults.rs
use std::path::PathBuf;

use crate::consts::DEFAULT_PROFILE_SUBDIR;

pub const DEFAULT_PASSWORD_PROMPT: &str = "Password: ";
pub const DEFAULT_RETRY_PROMPT: &str = "Incorrect password, try again: ";

/// `~/.pki/nssdb`, or `./.pki/nssdb` when there is no home directory
pub fn default_profile_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_PROFILE_SUBDIR)
}
