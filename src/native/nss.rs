// src/native/nss.rs
//! Raw FFI binding to the system NSS libraries
//!
//! Only the handful of symbols the SDR path needs are declared here. NSS
//! state is process-global, so [`NssEngine`] is a zero-sized marker; the
//! singleton discipline lives in [`crate::engine::EngineHandle`].

#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::{c_char, c_int, c_uchar, c_uint, c_void, CStr, CString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{self, NonNull};

use crate::consts::SEC_ERROR_INVALID_ARGS;
use crate::error::ErrorCode;
use crate::native::{NativeItem, PasswordFunc, SecurityEngine};

type SECStatus = c_int;
type PRStatus = c_int;
type PRBool = c_int;

const SEC_SUCCESS: SECStatus = 0;
const PR_TRUE: PRBool = 1;
const PR_FALSE: PRBool = 0;
const SI_BUFFER: c_int = 0;

#[repr(C)]
pub struct SECItem {
    type_: c_int,
    data: *mut c_uchar,
    len: c_uint,
}

#[link(name = "nss3")]
extern "C" {
    fn NSS_Init(configdir: *const c_char) -> SECStatus;
    fn NSS_Shutdown() -> SECStatus;
    fn PK11_SetPasswordFunc(func: Option<PasswordFunc>);
    fn NSSBase64_DecodeBuffer(
        arena: *mut c_void,
        out: *mut SECItem,
        input: *const c_char,
        len: c_uint,
    ) -> *mut SECItem;
    fn PK11SDR_Decrypt(data: *mut SECItem, result: *mut SECItem, cx: *mut c_void) -> SECStatus;
}

#[link(name = "nssutil3")]
extern "C" {
    fn SECITEM_ZfreeItem(zap: *mut SECItem, freeit: PRBool);
    fn PORT_GetError() -> c_int;
}

#[link(name = "plc4")]
extern "C" {
    fn PL_strdup(s: *const c_char) -> *mut c_char;
}

#[link(name = "nspr4")]
extern "C" {
    fn PR_Cleanup() -> PRStatus;
}

/// NSS-owned `SECItem`, zero-freed on drop
pub enum NssItem {
    /// Item struct and data both allocated by NSS
    Allocated(NonNull<SECItem>),
    /// Item struct owned by us, data allocated by NSS
    Inline(Box<SECItem>),
}

impl NssItem {
    fn raw(&self) -> *const SECItem {
        match self {
            NssItem::Allocated(item) => item.as_ptr(),
            NssItem::Inline(item) => &**item,
        }
    }
}

impl fmt::Debug for NssItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NssItem")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl NativeItem for NssItem {
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: the item is live for as long as `self`
        unsafe {
            let item = &*self.raw();
            if item.data.is_null() || item.len == 0 {
                &[]
            } else {
                std::slice::from_raw_parts(item.data, item.len as usize)
            }
        }
    }
}

impl Drop for NssItem {
    fn drop(&mut self) {
        // SAFETY: each variant is released exactly once with the matching `freeit`
        unsafe {
            match self {
                NssItem::Allocated(item) => SECITEM_ZfreeItem(item.as_ptr(), PR_TRUE),
                NssItem::Inline(item) => SECITEM_ZfreeItem(&mut **item, PR_FALSE),
            }
        }
    }
}

/// The system NSS library
#[derive(Debug, Default, Clone, Copy)]
pub struct NssEngine;

impl SecurityEngine for NssEngine {
    type Item = NssItem;

    fn set_password_func(&self, func: PasswordFunc) {
        unsafe { PK11_SetPasswordFunc(Some(func)) }
    }

    fn init(&self, config_dir: &Path) -> Result<(), ErrorCode> {
        let dir = CString::new(config_dir.as_os_str().as_bytes())
            .map_err(|_| SEC_ERROR_INVALID_ARGS)?;
        if unsafe { NSS_Init(dir.as_ptr()) } != SEC_SUCCESS {
            return Err(self.last_error());
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ErrorCode> {
        if unsafe { NSS_Shutdown() } != SEC_SUCCESS {
            return Err(self.last_error());
        }
        Ok(())
    }

    fn cleanup(&self) {
        unsafe {
            PR_Cleanup();
        }
    }

    fn base64_decode(&self, input: &[u8]) -> Option<NssItem> {
        let len = c_uint::try_from(input.len()).ok()?;
        let item = unsafe {
            NSSBase64_DecodeBuffer(
                ptr::null_mut(),
                ptr::null_mut(),
                input.as_ptr().cast::<c_char>(),
                len,
            )
        };
        NonNull::new(item).map(NssItem::Allocated)
    }

    fn last_error(&self) -> ErrorCode {
        ErrorCode(unsafe { PORT_GetError() })
    }

    unsafe fn sdr_decrypt(&self, data: &NssItem, arg: *mut c_void) -> Result<NssItem, ErrorCode> {
        let mut boxed = Box::new(SECItem {
            type_: SI_BUFFER,
            data: ptr::null_mut(),
            len: 0,
        });
        let out = &mut *boxed as *mut SECItem;
        // Wrapped before the call so the data NSS allocates is zero-freed on every path
        let result = NssItem::Inline(boxed);
        // NSS takes the input as non-const but does not modify it
        if PK11SDR_Decrypt(data.raw() as *mut SECItem, out, arg) != SEC_SUCCESS {
            return Err(self.last_error());
        }
        Ok(result)
    }

    fn strdup(&self, value: &CStr) -> *mut c_char {
        unsafe { PL_strdup(value.as_ptr()) }
    }
}
