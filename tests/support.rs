// tests/support.rs
//! Test utilities — throwaway soft-token profiles

use pwdecrypt::{EngineHandle, Password, SoftEngine, SoftToken};
use tempfile::TempDir;

/// Password every login-protected test profile is provisioned with
pub const TOKEN_PASSWORD: &str = "correct horse battery staple";

/// Keeps test runs fast; the derivation itself is covered by unit tests
const TEST_KDF_ITERATIONS: u32 = 1;

#[allow(dead_code)] // Not every test binary uses every helper
pub struct TestProfile {
    dir: TempDir,
    token: SoftToken,
    password: Option<Password>,
}

#[allow(dead_code)]
impl TestProfile {
    /// Profile whose token asks for [`TOKEN_PASSWORD`]
    pub fn with_login() -> Self {
        Self::provision(Some(Password::new(TOKEN_PASSWORD.to_string())))
    }

    /// Profile whose token never asks for a password
    pub fn without_login() -> Self {
        Self::provision(None)
    }

    fn provision(password: Option<Password>) -> Self {
        let dir = tempfile::tempdir().expect("create profile dir");
        let token = SoftToken::provision(dir.path(), password.as_ref(), TEST_KDF_ITERATIONS)
            .expect("provision soft token");
        Self {
            dir,
            token,
            password,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Encrypt `plaintext` into a base64 blob this profile's token can open
    pub fn seal(&self, plaintext: &[u8]) -> String {
        self.token
            .encrypt(self.password.as_ref(), plaintext)
            .expect("seal test secret")
    }

    /// Initialize a fresh engine on this profile.
    ///
    /// The returned clone shares state with the handle's engine, so buffer
    /// accounting stays observable after the handle is gone.
    pub fn start(&self) -> (EngineHandle<SoftEngine>, SoftEngine) {
        let engine = SoftEngine::new();
        let observer = engine.clone();
        let handle = EngineHandle::initialize(engine, self.path()).expect("initialize engine");
        (handle, observer)
    }
}

#[allow(dead_code)]
pub fn password(text: &str) -> Password {
    Password::new(text.to_string())
}
