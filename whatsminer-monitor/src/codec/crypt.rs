//! MD5-based crypt(3) (`$1$`), used by the device to derive session keys.
//!
//! The device never sends the admin password over the wire. Instead it hands
//! out salts, and both sides run the password through md5-crypt to arrive at
//! the same AES key and token. Only the 22-character hash segment (the part
//! after the last `$`) is ever used.

use pwhash::{HashSetup, md5_crypt as md5};

use crate::error::{Result, WhatsminerError};

const MAX_SALT_LEN: usize = 8;

/// Full md5-crypt string: `$1$<salt>$<hash>`.
pub fn md5_crypt(password: &[u8], salt: &str) -> Result<String> {
    let setup = HashSetup {
        salt: Some(truncate_salt(salt)),
        rounds: None,
    };
    md5::hash_with(setup, password)
        .map_err(|e| WhatsminerError::InvalidResponse(format!("md5-crypt with salt {salt:?}: {e}")))
}

/// Only the hash segment of [`md5_crypt`].
pub fn md5_crypt_hash(password: &[u8], salt: &str) -> Result<String> {
    let full = md5_crypt(password, salt)?;
    match full.rsplit_once('$') {
        Some((_, hash)) => Ok(hash.to_string()),
        None => Err(WhatsminerError::InvalidResponse(format!(
            "md5-crypt produced {full:?}"
        ))),
    }
}

fn truncate_salt(salt: &str) -> &str {
    match salt.char_indices().nth(MAX_SALT_LEN) {
        Some((end, _)) => &salt[..end],
        None => salt,
    }
}
