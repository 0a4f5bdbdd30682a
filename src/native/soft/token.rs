// src/native/soft/token.rs
//! Software token key store and SDR blob format
//!
//! The token lives in `<profile>/softtoken.toml`. Its key is derived from
//! the login password with PBKDF2-HMAC-SHA256 into 64 bytes: the first half
//! keys AES-256-CBC, the second half keys HMAC-SHA256. A stored HMAC over a
//! fixed label lets the token tell a wrong password from a right one.
//!
//! Blob layout: `SDR1 ‖ iv(16) ‖ AES-256-CBC/PKCS#7 ciphertext ‖ tag(32)`,
//! where the tag authenticates everything before it.

use std::fs;
use std::path::{Path, PathBuf};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256Dec, Aes256Enc};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::aliases::{Password, TokenKey64};
use crate::consts::{
    AES_BLOCK_LEN, HMAC_TAG_LEN, PASSWORD_CHECK_LABEL, SALT_LEN, SDR_MAGIC, SOFT_TOKEN_FILE,
    SOFT_TOKEN_VERSION,
};
use crate::error::{Result, SdrError};

type HmacSha256 = Hmac<Sha256>;

const MIN_BLOB_LEN: usize = SDR_MAGIC.len() + AES_BLOCK_LEN + AES_BLOCK_LEN + HMAC_TAG_LEN;

/// On-disk representation of the key store
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenStore {
    version: u32,
    kdf_iterations: u32,
    salt: String,
    check: String,
    needs_login: bool,
}

/// A loaded software token
#[derive(Debug, Clone)]
pub struct SoftToken {
    dir: PathBuf,
    kdf_iterations: u32,
    salt: [u8; SALT_LEN],
    check: [u8; HMAC_TAG_LEN],
    needs_login: bool,
}

/// Borrowed view of a structurally valid blob, before authentication
pub(crate) struct SdrBlob<'a> {
    iv: &'a [u8],
    ciphertext: &'a [u8],
    tag: &'a [u8],
    authenticated: &'a [u8],
}

impl<'a> SdrBlob<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < MIN_BLOB_LEN || !data.starts_with(SDR_MAGIC) {
            return None;
        }
        let (authenticated, tag) = data.split_at(data.len() - HMAC_TAG_LEN);
        let (iv, ciphertext) = authenticated[SDR_MAGIC.len()..].split_at(AES_BLOCK_LEN);
        if ciphertext.len() % AES_BLOCK_LEN != 0 {
            return None;
        }
        Some(Self {
            iv,
            ciphertext,
            tag,
            authenticated,
        })
    }
}

impl SoftToken {
    /// Path of the key store inside a profile directory
    pub fn store_path(dir: &Path) -> PathBuf {
        dir.join(SOFT_TOKEN_FILE)
    }

    /// Create a new token in `dir`, overwriting any existing store.
    ///
    /// `None` provisions a token without a login password; decrypting with
    /// it never asks for one.
    pub fn provision(dir: &Path, password: Option<&Password>, kdf_iterations: u32) -> Result<Self> {
        if kdf_iterations == 0 {
            return Err(SdrError::Token("KDF iterations must be ≥1".into()));
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| SdrError::Token(format!("OS RNG failure: {e}")))?;

        let secret = password.map(|p| p.expose_secret().as_bytes()).unwrap_or(b"");
        let key = derive_key(secret, &salt, kdf_iterations)?;
        let check = password_check(&key)?;

        let token = Self {
            dir: dir.to_path_buf(),
            kdf_iterations,
            salt,
            check,
            needs_login: password.is_some(),
        };

        let store = TokenStore {
            version: SOFT_TOKEN_VERSION,
            kdf_iterations,
            salt: STANDARD.encode(salt),
            check: STANDARD.encode(check),
            needs_login: token.needs_login,
        };
        let text = toml::to_string_pretty(&store)
            .map_err(|e| SdrError::Token(format!("cannot serialize key store: {e}")))?;

        fs::create_dir_all(dir)?;
        fs::write(Self::store_path(dir), text)?;

        Ok(token)
    }

    /// Load the token stored in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let text = fs::read_to_string(Self::store_path(dir))?;
        let store: TokenStore = toml::from_str(&text)
            .map_err(|e| SdrError::Token(format!("invalid key store: {e}")))?;

        if store.version != SOFT_TOKEN_VERSION {
            return Err(SdrError::Token(format!(
                "unsupported key store version {}",
                store.version
            )));
        }
        if store.kdf_iterations == 0 {
            return Err(SdrError::Token("KDF iterations must be ≥1".into()));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            kdf_iterations: store.kdf_iterations,
            salt: decode_fixed(&store.salt, "salt")?,
            check: decode_fixed(&store.check, "check")?,
            needs_login: store.needs_login,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn needs_login(&self) -> bool {
        self.needs_login
    }

    /// Derive the token key from `password`; `None` if the password is wrong
    pub fn unlock(&self, password: &[u8]) -> Option<TokenKey64> {
        let key = derive_key(password, &self.salt, self.kdf_iterations).ok()?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key(&key)).ok()?;
        mac.update(PASSWORD_CHECK_LABEL);
        mac.verify_slice(&self.check).ok()?;
        Some(key)
    }

    /// Encrypt `plaintext` into a base64 SDR blob this token can decrypt
    pub fn encrypt(&self, password: Option<&Password>, plaintext: &[u8]) -> Result<String> {
        let secret = password.map(|p| p.expose_secret().as_bytes()).unwrap_or(b"");
        let key = self
            .unlock(secret)
            .ok_or_else(|| SdrError::Token("wrong token password".into()))?;

        let mut iv = [0u8; AES_BLOCK_LEN];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| SdrError::Token(format!("OS RNG failure: {e}")))?;

        let mut blob = Vec::with_capacity(MIN_BLOB_LEN + plaintext.len());
        blob.extend_from_slice(SDR_MAGIC);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&cbc_encrypt(enc_key(&key), &iv, plaintext));

        let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key(&key))
            .map_err(|e| SdrError::Token(format!("HMAC init failed: {e}")))?;
        mac.update(&blob);
        blob.extend_from_slice(&mac.finalize().into_bytes());

        Ok(STANDARD.encode(&blob))
    }
}

/// Authenticate and decrypt a parsed blob; `None` on any integrity failure
pub(crate) fn open_blob(key: &TokenKey64, blob: &SdrBlob<'_>) -> Option<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key(key)).ok()?;
    mac.update(blob.authenticated);
    mac.verify_slice(blob.tag).ok()?;
    cbc_decrypt(enc_key(key), blob.iv, blob.ciphertext)
}

fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<TokenKey64> {
    let mut key = TokenKey64::new([0u8; 64]);
    pbkdf2::<HmacSha256>(password, salt, iterations, key.expose_secret_mut())
        .map_err(|e| SdrError::Token(format!("PBKDF2 failed: {e}")))?;
    Ok(key)
}

fn password_check(key: &TokenKey64) -> Result<[u8; HMAC_TAG_LEN]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key(key))
        .map_err(|e| SdrError::Token(format!("HMAC init failed: {e}")))?;
    mac.update(PASSWORD_CHECK_LABEL);
    Ok(mac.finalize().into_bytes().into())
}

#[inline]
fn enc_key(key: &TokenKey64) -> &[u8] {
    &key.expose_secret()[..32]
}

#[inline]
fn mac_key(key: &TokenKey64) -> &[u8] {
    &key.expose_secret()[32..]
}

fn decode_fixed<const N: usize>(field: &str, name: &str) -> Result<[u8; N]> {
    let bytes = STANDARD
        .decode(field)
        .map_err(|e| SdrError::Token(format!("invalid {name}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| SdrError::Token(format!("invalid {name} length")))
}

fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Enc::new(GenericArray::from_slice(key));
    let pad = AES_BLOCK_LEN - plaintext.len() % AES_BLOCK_LEN;

    let mut buf = Vec::with_capacity(plaintext.len() + pad);
    buf.extend_from_slice(plaintext);
    buf.resize(plaintext.len() + pad, pad as u8);

    let mut prev = [0u8; AES_BLOCK_LEN];
    prev.copy_from_slice(iv);
    for chunk in buf.chunks_exact_mut(AES_BLOCK_LEN) {
        chunk.iter_mut().zip(prev.iter()).for_each(|(b, p)| *b ^= p);
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        prev.copy_from_slice(chunk);
    }
    buf
}

fn cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_LEN != 0 {
        return None;
    }
    let cipher = Aes256Dec::new(GenericArray::from_slice(key));

    let mut buf = ciphertext.to_vec();
    let mut prev = [0u8; AES_BLOCK_LEN];
    prev.copy_from_slice(iv);
    for chunk in buf.chunks_exact_mut(AES_BLOCK_LEN) {
        let mut saved = [0u8; AES_BLOCK_LEN];
        saved.copy_from_slice(chunk);
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        chunk.iter_mut().zip(prev.iter()).for_each(|(b, p)| *b ^= p);
        prev = saved;
    }

    let pad = usize::from(*buf.last()?);
    let valid = (1..=AES_BLOCK_LEN).contains(&pad)
        && buf[buf.len() - pad..].iter().all(|&b| usize::from(b) == pad);
    if !valid {
        buf.zeroize();
        return None;
    }
    buf.truncate(buf.len() - pad);
    Some(buf)
}
