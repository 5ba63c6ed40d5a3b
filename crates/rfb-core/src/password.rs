//! Reversible obfuscation of VNC passwords for at-rest storage.
//!
//! Passwords are stored as 16 hex characters: the 8-byte secret encrypted
//! with single-block DES under a fixed, publicly known key.  This keeps
//! secrets from being readable at a glance in configuration files.  It is
//! **not** encryption in any meaningful sense: anyone with this source can
//! reverse it.
//!
//! # Length handling
//!
//! The secret is always exactly [`PASSWORD_SIZE`] bytes.  [`encode`] zero-pads
//! shorter input and silently truncates longer input.  Truncation is lossy:
//! `decode(encode(b"longpassword"))` yields `b"longpass"`.
//!
//! # Key
//!
//! The classic VNC obfuscation key is `17 52 6b 06 23 4e 58 07` as fed to the
//! bit-mirrored DES implementation shipped with RFB servers.  Standard DES
//! (as implemented by the `des` crate) needs every key byte bit-reversed,
//! which gives [`OBFUSCATION_KEY`].

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use des::Des;
use thiserror::Error;

use crate::config::PASSWORD_SIZE;

/// Fixed DES key (standard bit order) used for obfuscation.
pub const OBFUSCATION_KEY: [u8; 8] = [0xE8, 0x4A, 0xD6, 0x60, 0xC4, 0x72, 0x1A, 0xE0];

/// Length of the obfuscated text form.
pub const OBFUSCATED_LEN: usize = PASSWORD_SIZE * 2;

/// Errors returned when decoding the obfuscated text form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordFormatError {
    #[error("obfuscated password must be {OBFUSCATED_LEN} hex characters, got {0}")]
    WrongLength(usize),

    #[error("obfuscated password contains non-hex characters")]
    InvalidHex,
}

fn cipher() -> Des {
    Des::new(GenericArray::from_slice(&OBFUSCATION_KEY))
}

/// Obfuscates `plain` into 16 lowercase hex characters.
///
/// Input shorter than 8 bytes is zero-padded, longer input is truncated.
pub fn encode(plain: &[u8]) -> String {
    let mut block = [0u8; PASSWORD_SIZE];
    let n = plain.len().min(PASSWORD_SIZE);
    block[..n].copy_from_slice(&plain[..n]);

    let mut block = GenericArray::from(block);
    cipher().encrypt_block(&mut block);
    hex::encode(block)
}

/// Reverses [`encode`].  Upper- and lowercase hex are both accepted.
///
/// # Errors
///
/// Returns [`PasswordFormatError::WrongLength`] unless `obfuscated` is exactly
/// 16 characters, and [`PasswordFormatError::InvalidHex`] for non-hex input.
pub fn decode(obfuscated: &str) -> Result<[u8; PASSWORD_SIZE], PasswordFormatError> {
    if obfuscated.len() != OBFUSCATED_LEN {
        return Err(PasswordFormatError::WrongLength(obfuscated.len()));
    }
    let mut raw = [0u8; PASSWORD_SIZE];
    hex::decode_to_slice(obfuscated, &mut raw).map_err(|_| PasswordFormatError::InvalidHex)?;

    let mut block = GenericArray::from(raw);
    cipher().decrypt_block(&mut block);
    Ok(block.into())
}

/// Decodes and returns the password as text, stopping at the first NUL byte.
///
/// Non-UTF-8 bytes are replaced with U+FFFD.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_to_string(obfuscated: &str) -> Result<String, PasswordFormatError> {
    let raw = decode(obfuscated)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(PASSWORD_SIZE);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}
