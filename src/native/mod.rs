// src/native/mod.rs
//! Narrow interface to the external security engine
//!
//! Everything pwdecrypt needs from the native side goes through
//! [`SecurityEngine`]: a base64 decoder with an out-of-band error code, the
//! SDR decrypt primitive driven by a C-ABI password callback, process-wide
//! init/shutdown, and the engine's own string allocator for handing
//! passwords across the boundary.
//!
//! Two engines implement it:
//! - [`soft::SoftEngine`] — pure-Rust software token (always built)
//! - `nss::NssEngine` — raw FFI to the system NSS libraries (`nss` feature)

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;

use crate::error::ErrorCode;

#[cfg(feature = "nss")]
pub mod nss;
pub mod soft;

#[cfg(feature = "nss")]
pub use nss::{NssEngine, NssItem};
pub use soft::{SoftEngine, SoftItem, SoftToken};

/// C-ABI password callback, layout-compatible with NSS's `PK11PasswordFunc`.
///
/// `retry` is non-zero when the previous password was rejected. The callee
/// returns a password allocated with [`SecurityEngine::strdup`] (ownership
/// moves to the engine) or null to abort the attempt.
pub type PasswordFunc =
    unsafe extern "C" fn(slot: *mut c_void, retry: c_int, arg: *mut c_void) -> *mut c_char;

/// A buffer owned by the native engine.
///
/// Implementors release (and zero) the memory in `Drop`, so every exit path
/// frees it exactly once.
pub trait NativeItem {
    fn as_bytes(&self) -> &[u8];

    #[inline]
    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait SecurityEngine {
    type Item: NativeItem;

    /// Register the process-wide password callback (`PK11_SetPasswordFunc`)
    fn set_password_func(&self, func: PasswordFunc);

    /// Open the key database in `config_dir` (`NSS_Init`)
    fn init(&self, config_dir: &Path) -> Result<(), ErrorCode>;

    /// Close the key database (`NSS_Shutdown`)
    fn shutdown(&self) -> Result<(), ErrorCode>;

    /// Best-effort teardown of process-wide runtime resources (`PR_Cleanup`)
    fn cleanup(&self);

    /// Decode base64 text. `None` signals failure; the cause is in
    /// [`last_error`](Self::last_error). An empty item may also come back.
    fn base64_decode(&self, input: &[u8]) -> Option<Self::Item>;

    /// Last native error code (`PORT_GetError`)
    fn last_error(&self) -> ErrorCode;

    /// Decrypt an SDR blob (`PK11SDR_Decrypt`).
    ///
    /// # Safety
    ///
    /// `arg` is passed verbatim to the registered [`PasswordFunc`] and must
    /// be whatever that function expects, valid for the whole call.
    unsafe fn sdr_decrypt(&self, data: &Self::Item, arg: *mut c_void)
        -> Result<Self::Item, ErrorCode>;

    /// Duplicate a string with the engine's allocator (`PL_strdup`).
    /// Null on allocation failure.
    fn strdup(&self, value: &CStr) -> *mut c_char;
}
