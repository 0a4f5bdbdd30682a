// src/codec.rs
//! Base64 decoding of encoded secrets into engine-owned buffers

use tracing::debug;

use crate::error::{Result, SdrError};
use crate::native::{NativeItem, SecurityEngine};

/// Decode `encoded` into a buffer owned by `engine`.
///
/// A decode that yields zero bytes is a failure too, even when the engine
/// set no error code: the native decoder signals "invalid" and "empty" the
/// same way.
pub fn decode<E: SecurityEngine>(engine: &E, encoded: &[u8]) -> Result<E::Item> {
    match engine.base64_decode(encoded) {
        Some(item) if !item.is_empty() => Ok(item),
        partial => {
            let code = engine.last_error();
            // Release any empty item before surfacing the error
            drop(partial);
            debug!(len = encoded.len(), %code, "decode failed");
            Err(SdrError::DecodeFailed {
                input: encoded.to_vec(),
                code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{NO_ERROR, SEC_ERROR_BAD_DATA};
    use crate::native::SoftEngine;

    #[test]
    fn test_decode_valid_input() {
        let engine = SoftEngine::new();
        let item = decode(&engine, b"c2VjcmV0").unwrap();
        assert_eq!(item.as_bytes(), b"secret");
    }

    #[test]
    fn test_decode_empty_input_reports_engine_code() {
        let engine = SoftEngine::new();
        let err = decode(&engine, b"").unwrap_err();
        assert!(err.is_decode_failure());
        assert_eq!(err.code(), Some(engine.last_error()));
        assert_eq!(err.input(), Some(&b""[..]));
        assert_eq!(engine.live_items(), 0);
    }

    #[test]
    fn test_decode_malformed_input_carries_native_code() {
        let engine = SoftEngine::new();
        let err = decode(&engine, b"@@@").unwrap_err();
        assert_eq!(err.code(), Some(SEC_ERROR_BAD_DATA));
        assert_eq!(err.input(), Some(&b"@@@"[..]));
        assert_eq!(engine.live_items(), 0);
    }

    #[test]
    fn test_decode_to_nothing_is_a_failure_and_releases_buffer() {
        let engine = SoftEngine::new();
        let err = decode(&engine, b"\n\n").unwrap_err();
        assert!(err.is_decode_failure());
        assert_eq!(err.code(), Some(NO_ERROR));
        assert_eq!(engine.live_items(), 0);
    }
}
