//! AES-256-ECB envelope used by the authenticated dialect.

use std::fmt;

use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

use crate::error::{Result, WhatsminerError};

const BLOCK_LEN: usize = 16;

/// Session cipher keyed from the md5-crypt derived key.
///
/// Plaintext is zero-padded to the block size; the device strips trailing
/// NULs on its side, and we do the same for replies.
#[derive(Clone)]
pub struct SessionCipher {
    aes: Aes256,
}

impl SessionCipher {
    /// AES key is SHA-256 of the derived key string.
    pub fn from_key(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self {
            aes: Aes256::new(&digest),
        }
    }

    /// Encrypt and base64-encode (single line, no wrapping).
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut buf = plaintext.as_bytes().to_vec();
        buf.resize(buf.len().div_ceil(BLOCK_LEN) * BLOCK_LEN, 0);
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            self.aes.encrypt_block(GenericArray::from_mut_slice(block));
        }
        STANDARD.encode(buf)
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let mut buf = STANDARD
            .decode(encoded.trim())
            .map_err(|e| WhatsminerError::DecodeError(format!("bad base64: {e}")))?;
        if buf.len() % BLOCK_LEN != 0 {
            return Err(WhatsminerError::DecodeError(format!(
                "ciphertext length {} is not a multiple of {BLOCK_LEN}",
                buf.len()
            )));
        }
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            self.aes.decrypt_block(GenericArray::from_mut_slice(block));
        }
        let text = String::from_utf8(buf)
            .map_err(|_| WhatsminerError::DecodeError("plaintext is not UTF-8".into()))?;
        Ok(text.trim_end_matches(['\0', '\n', ' ']).to_string())
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
