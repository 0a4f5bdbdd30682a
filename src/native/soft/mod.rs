// src/native/soft/mod.rs
//! Pure-Rust software token engine
//!
//! Implements [`SecurityEngine`] with the same contract the NSS engine has:
//! native-owned buffers released on drop, an out-of-band last-error code,
//! and a C-ABI password callback that is asked once and, only after a wrong
//! password, once more with `retry` set.
//!
//! Unlike NSS the token does not stay logged in between calls; every
//! decrypt authenticates again.

mod token;

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::fmt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use zeroize::Zeroize;

use crate::aliases::TokenKey64;
use crate::consts::{
    NO_ERROR, SEC_ERROR_BAD_DATA, SEC_ERROR_BAD_DATABASE, SEC_ERROR_BAD_PASSWORD, SEC_ERROR_BUSY,
    SEC_ERROR_NOT_INITIALIZED,
};
use crate::error::ErrorCode;
use crate::native::{NativeItem, PasswordFunc, SecurityEngine};

pub use token::SoftToken;
use token::{open_blob, SdrBlob};

#[derive(Default)]
struct SoftState {
    password_func: Option<PasswordFunc>,
    token: Option<SoftToken>,
    last_error: ErrorCode,
}

#[derive(Default)]
struct SoftInner {
    state: Mutex<SoftState>,
    live_items: Arc<AtomicUsize>,
    live_passwords: AtomicUsize,
}

/// Software token engine.
///
/// Clones share the same state, so a test can keep a clone to watch buffer
/// accounting after the handle that owns the engine is gone.
#[derive(Clone, Default)]
pub struct SoftEngine {
    inner: Arc<SoftInner>,
}

/// Engine-owned buffer; zeroed and released on drop
pub struct SoftItem {
    data: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl SoftItem {
    fn new(data: Vec<u8>, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            data,
            live: Arc::clone(live),
        }
    }
}

impl fmt::Debug for SoftItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftItem")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl NativeItem for SoftItem {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for SoftItem {
    fn drop(&mut self) {
        self.data.zeroize();
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SoftEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers handed out by this engine and not yet released
    pub fn live_items(&self) -> usize {
        self.inner.live_items.load(Ordering::Acquire)
    }

    /// Passwords duplicated with [`strdup`](SecurityEngine::strdup) and not yet freed
    pub fn live_passwords(&self) -> usize {
        self.inner.live_passwords.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().token.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SoftState> {
        // A poisoned lock only means a panic elsewhere; the state stays consistent
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fail(&self, code: ErrorCode) -> ErrorCode {
        self.lock().last_error = code;
        code
    }

    /// Log in, asking the callback once and once more after a wrong password
    unsafe fn authenticate(
        &self,
        token: &SoftToken,
        func: Option<PasswordFunc>,
        arg: *mut c_void,
    ) -> Result<TokenKey64, ErrorCode> {
        if !token.needs_login() {
            return token.unlock(b"").ok_or(SEC_ERROR_BAD_DATABASE);
        }
        let func = func.ok_or(SEC_ERROR_BAD_PASSWORD)?;

        for retry in [false, true] {
            let raw = func(ptr::null_mut(), c_int::from(retry), arg);
            if raw.is_null() {
                return Err(SEC_ERROR_BAD_PASSWORD);
            }
            let mut password = self.take_password(raw);
            let key = token.unlock(&password);
            password.zeroize();
            if let Some(key) = key {
                return Ok(key);
            }
            debug!(retry, "soft token rejected password");
        }
        Err(SEC_ERROR_BAD_PASSWORD)
    }

    /// Reclaim a password produced by `strdup`
    unsafe fn take_password(&self, raw: *mut c_char) -> Vec<u8> {
        self.inner.live_passwords.fetch_sub(1, Ordering::AcqRel);
        CString::from_raw(raw).into_bytes()
    }
}

impl SecurityEngine for SoftEngine {
    type Item = SoftItem;

    fn set_password_func(&self, func: PasswordFunc) {
        self.lock().password_func = Some(func);
    }

    fn init(&self, config_dir: &Path) -> Result<(), ErrorCode> {
        let mut state = self.lock();
        if state.token.is_some() {
            state.last_error = SEC_ERROR_BUSY;
            return Err(SEC_ERROR_BUSY);
        }
        match SoftToken::open(config_dir) {
            Ok(token) => {
                state.token = Some(token);
                Ok(())
            }
            Err(err) => {
                debug!(dir = %config_dir.display(), %err, "cannot open soft token");
                state.last_error = SEC_ERROR_BAD_DATABASE;
                Err(SEC_ERROR_BAD_DATABASE)
            }
        }
    }

    fn shutdown(&self) -> Result<(), ErrorCode> {
        let mut state = self.lock();
        if state.token.take().is_none() {
            state.last_error = SEC_ERROR_NOT_INITIALIZED;
            return Err(SEC_ERROR_NOT_INITIALIZED);
        }
        // Outstanding buffers keep the token busy; it is closed anyway
        if self.live_items() > 0 {
            state.last_error = SEC_ERROR_BUSY;
            return Err(SEC_ERROR_BUSY);
        }
        Ok(())
    }

    fn cleanup(&self) {
        self.lock().password_func = None;
    }

    fn base64_decode(&self, input: &[u8]) -> Option<SoftItem> {
        self.lock().last_error = NO_ERROR;

        let mut text: Vec<u8> = input
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let decoded = STANDARD.decode(&text);
        text.zeroize();

        match decoded {
            Ok(bytes) => Some(SoftItem::new(bytes, &self.inner.live_items)),
            Err(err) => {
                debug!(%err, "base64 decode failed");
                self.fail(SEC_ERROR_BAD_DATA);
                None
            }
        }
    }

    fn last_error(&self) -> ErrorCode {
        self.lock().last_error
    }

    unsafe fn sdr_decrypt(&self, data: &SoftItem, arg: *mut c_void) -> Result<SoftItem, ErrorCode> {
        // The callback runs resolver code; never hold the lock across it
        let (func, token) = {
            let state = self.lock();
            (state.password_func, state.token.clone())
        };

        let token = token.ok_or_else(|| self.fail(SEC_ERROR_NOT_INITIALIZED))?;
        let blob = SdrBlob::parse(data.as_bytes()).ok_or_else(|| self.fail(SEC_ERROR_BAD_DATA))?;
        let key = self
            .authenticate(&token, func, arg)
            .map_err(|code| self.fail(code))?;
        let plaintext = open_blob(&key, &blob).ok_or_else(|| self.fail(SEC_ERROR_BAD_DATA))?;

        Ok(SoftItem::new(plaintext, &self.inner.live_items))
    }

    fn strdup(&self, value: &CStr) -> *mut c_char {
        self.inner.live_passwords.fetch_add(1, Ordering::AcqRel);
        value.to_owned().into_raw()
    }
}
