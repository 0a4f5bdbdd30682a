// src/engine.rs
//! Process-wide engine handle
//!
//! The native subsystem is global state. [`EngineHandle`] makes that
//! explicit: `initialize` claims the single process-wide slot, every decrypt
//! borrows the handle, and `shutdown` consumes it.

use std::cell::Cell;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::bridge::{password_trampoline, CallbackContext, PasswordSource};
use crate::error::{ErrorCode, Result, SdrError};
use crate::native::SecurityEngine;

/// Set while an initialized handle exists
static ENGINE_LIVE: AtomicBool = AtomicBool::new(false);

/// Handle to the initialized native subsystem.
///
/// `Send` but not `Sync`: the engine is not assumed thread-safe, so callers
/// sharing it across threads put it behind a `Mutex`.
pub struct EngineHandle<E: SecurityEngine> {
    engine: E,
    config_dir: PathBuf,
    released: bool,
    _not_sync: PhantomData<Cell<()>>,
}

impl<E: SecurityEngine> EngineHandle<E> {
    /// Initialize `engine` against the key database in `config_dir`.
    ///
    /// Fails with [`SdrError::AlreadyInitialized`] while another handle is
    /// live, and with [`SdrError::InitFailed`] if the engine refuses.
    pub fn initialize(engine: E, config_dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if ENGINE_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SdrError::AlreadyInitialized);
        }

        engine.set_password_func(password_trampoline::<E>);
        if let Err(code) = engine.init(&config_dir) {
            ENGINE_LIVE.store(false, Ordering::Release);
            warn!(dir = %config_dir.display(), %code, "engine initialization failed");
            return Err(SdrError::InitFailed { config_dir, code });
        }

        info!(dir = %config_dir.display(), "engine initialized");
        Ok(Self {
            engine,
            config_dir,
            released: false,
            _not_sync: PhantomData,
        })
    }

    /// Shut the engine down and release the process-wide slot.
    ///
    /// Runtime cleanup runs even when the engine reports an unclean shutdown;
    /// that failure is still returned.
    pub fn shutdown(mut self) -> Result<()> {
        let status = self.engine.shutdown();
        self.engine.cleanup();
        self.release();

        match status {
            Ok(()) => {
                info!(dir = %self.config_dir.display(), "engine shut down");
                Ok(())
            }
            Err(code) => {
                warn!(%code, "engine shutdown reported failure");
                Err(SdrError::ShutdownFailed { code })
            }
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Run the native primitive with `source` wired in as the callback argument
    pub(crate) fn decrypt_raw(
        &self,
        decoded: &E::Item,
        source: &mut PasswordSource<'_>,
    ) -> std::result::Result<E::Item, ErrorCode> {
        let mut ctx = CallbackContext {
            engine: &self.engine,
            source,
        };
        let arg = (&mut ctx as *mut CallbackContext<'_, '_, E>).cast::<c_void>();

        // SAFETY: the registered callback is `password_trampoline::<E>`, and
        // `ctx` outlives the synchronous native call
        unsafe { self.engine.sdr_decrypt(decoded, arg) }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            ENGINE_LIVE.store(false, Ordering::Release);
        }
    }
}

impl<E: SecurityEngine> Drop for EngineHandle<E> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                dir = %self.config_dir.display(),
                "engine handle dropped without shutdown; native state left open"
            );
            self.release();
        } else {
            debug!("engine handle released");
        }
    }
}
