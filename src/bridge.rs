// src/bridge.rs
//! Password callback bridge
//!
//! The native primitive asks for a password through a C-ABI callback, at
//! most twice per decrypt call (first request, then one retry after a wrong
//! password). The answer comes either from a fixed password or from a
//! caller-supplied resolver that may fail or panic.
//!
//! Neither an `Err` nor a panic can travel through native frames. The bridge
//! records the first failure in a slot, hands the engine a null pointer so it
//! aborts cleanly, and the session re-raises the failure once control is back
//! in Rust.

use std::any::Any;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::aliases::Password;
use crate::error::{ResolverError, SdrError};
use crate::native::SecurityEngine;

/// Resolver signature as seen by the bridge
pub type DynResolver<'a> = dyn FnMut(bool) -> Result<Password, ResolverError> + 'a;

/// A failure raised by the resolver during one decrypt call
pub enum CapturedFailure {
    Error(ResolverError),
    Panic(Box<dyn Any + Send + 'static>),
}

impl std::fmt::Debug for CapturedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapturedFailure::Error(err) => f.debug_tuple("Error").field(err).finish(),
            CapturedFailure::Panic(_) => f.write_str("Panic(..)"),
        }
    }
}

/// Adapts a fallible resolver to the native request/response protocol
pub struct PasswordBridge<'a> {
    resolver: &'a mut DynResolver<'a>,
    failure: Option<CapturedFailure>,
    invocations: u32,
}

impl<'a> PasswordBridge<'a> {
    pub fn new(resolver: &'a mut DynResolver<'a>) -> Self {
        Self {
            resolver,
            failure: None,
            invocations: 0,
        }
    }

    /// Times the native side has asked for a password
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    pub fn has_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Answer one password request.
    ///
    /// Returns the NUL-terminated password, or `None` — the sentinel that
    /// makes the native primitive abandon the attempt.
    pub fn on_request(&mut self, retry: bool) -> Option<Zeroizing<Vec<u8>>> {
        self.invocations += 1;
        trace!(retry, invocation = self.invocations, "password requested");

        let resolver = &mut self.resolver;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| resolver(retry)));

        match outcome {
            Ok(Ok(password)) => match to_c_bytes(&password) {
                Some(bytes) => Some(bytes),
                None => {
                    self.capture(CapturedFailure::Error(Box::new(
                        SdrError::PasswordContainsNul,
                    )));
                    None
                }
            },
            Ok(Err(err)) => {
                self.capture(CapturedFailure::Error(err));
                None
            }
            Err(payload) => {
                self.capture(CapturedFailure::Panic(payload));
                None
            }
        }
    }

    /// Take the captured failure, leaving the slot empty
    pub fn take_failure(&mut self) -> Option<CapturedFailure> {
        self.failure.take()
    }

    fn capture(&mut self, failure: CapturedFailure) {
        // Only the first failure is meaningful for one decrypt call
        if self.failure.is_some() {
            debug!("ignoring secondary resolver failure");
            return;
        }
        debug!(invocation = self.invocations, "resolver failed; aborting native attempt");
        self.failure = Some(failure);
    }
}

/// Where the native primitive gets its password from
pub enum PasswordSource<'a> {
    /// Fixed password, offered once; the retry request is refused
    Static(&'a Password),
    /// Caller-supplied resolver, consulted on every request
    Interactive(PasswordBridge<'a>),
}

impl<'a> PasswordSource<'a> {
    pub fn fixed(password: &'a Password) -> Self {
        PasswordSource::Static(password)
    }

    pub fn interactive(resolver: &'a mut DynResolver<'a>) -> Self {
        PasswordSource::Interactive(PasswordBridge::new(resolver))
    }

    pub fn on_request(&mut self, retry: bool) -> Option<Zeroizing<Vec<u8>>> {
        match self {
            PasswordSource::Static(_) if retry => None,
            PasswordSource::Static(password) => to_c_bytes(password),
            PasswordSource::Interactive(bridge) => bridge.on_request(retry),
        }
    }

    pub fn take_failure(&mut self) -> Option<CapturedFailure> {
        match self {
            PasswordSource::Static(_) => None,
            PasswordSource::Interactive(bridge) => bridge.take_failure(),
        }
    }
}

/// What the trampoline receives as its `arg`
pub(crate) struct CallbackContext<'c, 's, E: SecurityEngine> {
    pub(crate) engine: &'c E,
    pub(crate) source: &'c mut PasswordSource<'s>,
}

/// C-ABI entry point registered with the engine.
///
/// # Safety
///
/// `arg` must be null or point to a live `CallbackContext<E>`.
pub(crate) unsafe extern "C" fn password_trampoline<E: SecurityEngine>(
    _slot: *mut c_void,
    retry: c_int,
    arg: *mut c_void,
) -> *mut c_char {
    if arg.is_null() {
        return ptr::null_mut();
    }
    let ctx = &mut *arg.cast::<CallbackContext<'_, '_, E>>();

    // `on_request` catches resolver panics, so nothing unwinds past here
    match ctx.source.on_request(retry != 0) {
        Some(bytes) => match CStr::from_bytes_with_nul(&bytes) {
            Ok(password) => ctx.engine.strdup(password),
            Err(_) => ptr::null_mut(),
        },
        None => ptr::null_mut(),
    }
}

fn to_c_bytes(password: &Password) -> Option<Zeroizing<Vec<u8>>> {
    let raw = password.expose_secret().as_bytes();
    if raw.contains(&0) {
        return None;
    }
    let mut bytes = Zeroizing::new(Vec::with_capacity(raw.len() + 1));
    bytes.extend_from_slice(raw);
    bytes.push(0);
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn pw(s: &str) -> Password {
        Password::new(s.to_owned())
    }

    #[test]
    fn test_static_source_answers_once_then_refuses_retry() {
        let password = pw("hunter2");
        let mut source = PasswordSource::fixed(&password);

        let first = source.on_request(false).unwrap();
        assert_eq!(first.as_slice(), b"hunter2\0");
        assert!(source.on_request(true).is_none());
        assert!(source.take_failure().is_none());
    }

    #[test]
    fn test_bridge_passes_retry_flag_and_counts() {
        let mut seen = Vec::new();
        let mut resolver = |retry: bool| -> Result<Password, ResolverError> {
            seen.push(retry);
            Ok(pw(if retry { "second" } else { "first" }))
        };
        let mut bridge = PasswordBridge::new(&mut resolver);

        assert_eq!(bridge.on_request(false).unwrap().as_slice(), b"first\0");
        assert_eq!(bridge.on_request(true).unwrap().as_slice(), b"second\0");
        assert_eq!(bridge.invocations(), 2);
        assert!(!bridge.has_failure());
        drop(bridge);
        assert_eq!(seen, vec![false, true]);
    }

    #[test]
    fn test_bridge_keeps_first_failure_only() {
        let mut calls = 0;
        let mut resolver = |_retry: bool| -> Result<Password, ResolverError> {
            calls += 1;
            Err(Box::new(io::Error::new(io::ErrorKind::Other, format!("failure {calls}"))))
        };
        let mut bridge = PasswordBridge::new(&mut resolver);

        assert!(bridge.on_request(false).is_none());
        assert!(bridge.on_request(true).is_none());

        match bridge.take_failure() {
            Some(CapturedFailure::Error(err)) => assert_eq!(err.to_string(), "failure 1"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(bridge.take_failure().is_none());
    }

    #[test]
    fn test_bridge_captures_panic() {
        let mut resolver = |_retry: bool| -> Result<Password, ResolverError> {
            panic!("resolver exploded");
        };
        let mut bridge = PasswordBridge::new(&mut resolver);

        assert!(bridge.on_request(false).is_none());
        match bridge.take_failure() {
            Some(CapturedFailure::Panic(payload)) => {
                assert_eq!(payload.downcast_ref::<&str>(), Some(&"resolver exploded"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bridge_rejects_interior_nul() {
        let mut resolver = |_retry: bool| -> Result<Password, ResolverError> { Ok(pw("a\0b")) };
        let mut bridge = PasswordBridge::new(&mut resolver);

        assert!(bridge.on_request(false).is_none());
        match bridge.take_failure() {
            Some(CapturedFailure::Error(err)) => {
                let err = err.downcast::<SdrError>().unwrap();
                assert!(matches!(*err, SdrError::PasswordContainsNul));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
