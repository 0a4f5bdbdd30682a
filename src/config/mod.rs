// src/config/mod.rs
//! Configuration system for pwdecrypt
//!
//! Central, lazy-loaded global config with TOML + env overrides.

pub use app::{load, Backend, Config, Profile, Prompt};
pub use defaults::{default_profile_dir, DEFAULT_PASSWORD_PROMPT, DEFAULT_RETRY_PROMPT};

mod app;
mod defaults;
