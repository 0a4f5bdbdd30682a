// src/session.rs
//! One decrypt call: decode → native primitive → plaintext or structured failure
//!
//! Native buffers are RAII values, so the decoded input and the engine's
//! result are released on every path out of [`DecryptionSession::run`],
//! including a resumed resolver panic.

use std::panic;

use tracing::debug;

use crate::aliases::{Password, Plaintext};
use crate::bridge::{CapturedFailure, PasswordSource};
use crate::codec;
use crate::engine::EngineHandle;
use crate::error::{ResolverError, Result, SdrError};
use crate::native::{NativeItem, SecurityEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Decoding,
    Decrypting,
    Succeeded,
    Failed,
}

pub struct DecryptionSession<'h, E: SecurityEngine> {
    handle: &'h EngineHandle<E>,
    state: SessionState,
}

impl<'h, E: SecurityEngine> DecryptionSession<'h, E> {
    pub fn new(handle: &'h EngineHandle<E>) -> Self {
        Self {
            handle,
            state: SessionState::Decoding,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Decrypt `encoded`, asking `source` for the password.
    ///
    /// A resolver error captured during a failed native call replaces the
    /// native code. A captured panic resumes on this thread in every case.
    pub fn run(&mut self, encoded: &[u8], source: &mut PasswordSource<'_>) -> Result<Plaintext> {
        self.enter(SessionState::Decoding);
        let decoded = match codec::decode(self.handle.engine(), encoded) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.enter(SessionState::Failed);
                return Err(err);
            }
        };

        if let PasswordSource::Static(password) = source {
            if password.expose_secret().as_bytes().contains(&0) {
                drop(decoded);
                self.enter(SessionState::Failed);
                return Err(SdrError::PasswordContainsNul);
            }
        }

        self.enter(SessionState::Decrypting);
        let outcome = self.handle.decrypt_raw(&decoded, source);
        drop(decoded);

        match (outcome, source.take_failure()) {
            (outcome, Some(CapturedFailure::Panic(payload))) => {
                drop(outcome);
                self.enter(SessionState::Failed);
                panic::resume_unwind(payload)
            }
            (Ok(item), captured) => {
                if let Some(CapturedFailure::Error(err)) = captured {
                    debug!(%err, "native call succeeded; discarding resolver error");
                }
                let plaintext = Plaintext::new(item.as_bytes().to_vec());
                drop(item);
                self.enter(SessionState::Succeeded);
                Ok(plaintext)
            }
            (Err(_), Some(CapturedFailure::Error(err))) => {
                self.enter(SessionState::Failed);
                Err(SdrError::ResolverFailed(err))
            }
            (Err(code), None) => {
                self.enter(SessionState::Failed);
                Err(SdrError::DecryptFailed {
                    input: encoded.to_vec(),
                    code,
                })
            }
        }
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "decrypt session");
        self.state = next;
    }
}

/// Decrypt with a fixed password; a wrong password is not retried.
///
/// A password containing a NUL byte gives [`SdrError::PasswordContainsNul`]
/// once the input has decoded.
pub fn decrypt<E: SecurityEngine>(
    handle: &EngineHandle<E>,
    encoded: &[u8],
    password: &Password,
) -> Result<Plaintext> {
    let mut source = PasswordSource::fixed(password);
    DecryptionSession::new(handle).run(encoded, &mut source)
}

/// Decrypt, asking `resolver` for the password.
///
/// The resolver gets `false` on the first request and `true` on the single
/// retry after a wrong password. If it fails, its own error comes back as
/// [`SdrError::ResolverFailed`].
pub fn decrypt_interactive<E, F, R>(
    handle: &EngineHandle<E>,
    encoded: &[u8],
    mut resolver: F,
) -> Result<Plaintext>
where
    E: SecurityEngine,
    F: FnMut(bool) -> std::result::Result<Password, R>,
    R: Into<ResolverError>,
{
    let mut resolve = |retry: bool| -> std::result::Result<Password, ResolverError> {
        resolver(retry).map_err(Into::into)
    };
    let mut source = PasswordSource::interactive(&mut resolve);
    DecryptionSession::new(handle).run(encoded, &mut source)
}

/// [`decrypt`] for secrets known to be text
pub fn decrypt_str<E: SecurityEngine>(
    handle: &EngineHandle<E>,
    encoded: &[u8],
    password: &Password,
) -> Result<String> {
    let plaintext = decrypt(handle, encoded, password)?;
    let text = std::str::from_utf8(plaintext.expose_secret())?;
    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{c_char, c_void, CStr, CString};
    use std::io;
    use std::panic::AssertUnwindSafe;
    use std::path::Path;
    use std::ptr;
    use std::sync::Mutex;

    use serial_test::serial;

    use crate::error::ErrorCode;
    use crate::native::PasswordFunc;

    /// Asks for a password once and succeeds whatever the answer
    #[derive(Default)]
    struct LenientEngine {
        func: Mutex<Option<PasswordFunc>>,
    }

    struct Buf(Vec<u8>);

    impl NativeItem for Buf {
        fn as_bytes(&self) -> &[u8] {
            &self.0
        }
    }

    impl SecurityEngine for LenientEngine {
        type Item = Buf;

        fn set_password_func(&self, func: PasswordFunc) {
            *self.func.lock().unwrap() = Some(func);
        }

        fn init(&self, _config_dir: &Path) -> std::result::Result<(), ErrorCode> {
            Ok(())
        }

        fn shutdown(&self) -> std::result::Result<(), ErrorCode> {
            Ok(())
        }

        fn cleanup(&self) {}

        fn base64_decode(&self, input: &[u8]) -> Option<Buf> {
            Some(Buf(input.to_vec()))
        }

        fn last_error(&self) -> ErrorCode {
            ErrorCode::default()
        }

        unsafe fn sdr_decrypt(
            &self,
            _data: &Buf,
            arg: *mut c_void,
        ) -> std::result::Result<Buf, ErrorCode> {
            let func = (*self.func.lock().unwrap()).unwrap();
            let raw = func(ptr::null_mut(), 0, arg);
            if !raw.is_null() {
                drop(CString::from_raw(raw));
            }
            Ok(Buf(b"plain".to_vec()))
        }

        fn strdup(&self, value: &CStr) -> *mut c_char {
            value.to_owned().into_raw()
        }
    }

    #[test]
    #[serial]
    fn test_resolver_error_after_native_success_is_discarded() {
        let handle = EngineHandle::initialize(LenientEngine::default(), "unused").unwrap();

        let mut calls = Vec::new();
        let result = decrypt_interactive(&handle, b"blob", |retry| {
            calls.push(retry);
            Err::<Password, _>(io::Error::new(io::ErrorKind::Other, "cancelled"))
        });

        let plaintext = match result {
            Ok(plaintext) => plaintext,
            Err(err) => panic!("unexpected: {err}"),
        };
        assert_eq!(plaintext.expose_secret().as_slice(), b"plain");
        assert_eq!(calls, vec![false]);
        handle.shutdown().unwrap();
    }

    #[test]
    #[serial]
    fn test_resolver_panic_resumes_after_native_success() {
        let handle = EngineHandle::initialize(LenientEngine::default(), "unused").unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            decrypt_interactive(&handle, b"blob", |_retry| -> io::Result<Password> {
                panic!("resolver exploded")
            })
        }));

        let payload = outcome.err().unwrap();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"resolver exploded"));
        handle.shutdown().unwrap();
    }

    #[test]
    #[serial]
    fn test_static_password_with_nul_checked_after_decode() {
        let handle = EngineHandle::initialize(LenientEngine::default(), "unused").unwrap();
        let password = Password::new("a\0b".to_owned());

        let mut session = DecryptionSession::new(&handle);
        let err = session
            .run(b"blob", &mut PasswordSource::fixed(&password))
            .err()
            .unwrap();
        assert!(matches!(err, SdrError::PasswordContainsNul));
        assert_eq!(session.state(), SessionState::Failed);

        drop(session);
        handle.shutdown().unwrap();
    }
}
