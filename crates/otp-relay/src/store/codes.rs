//! Redeem code generation.

use super::error::{Result, StoreError};

/// Number of characters in a redeem code.
pub const CODE_LENGTH: usize = 6;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Largest multiple of 36 that fits in a byte; higher bytes are rejected so
// every character is equally likely.
const ACCEPT_BELOW: u8 = 252;

/// Generates a random code over `A-Z0-9`.
pub fn generate_code() -> Result<String> {
    let mut code = String::with_capacity(CODE_LENGTH);
    let mut buf = [0u8; 16];

    while code.len() < CODE_LENGTH {
        getrandom::getrandom(&mut buf).map_err(|e| StoreError::Random(e.to_string()))?;
        for &byte in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if code.len() == CODE_LENGTH {
                break;
            }
            code.push(ALPHABET[(byte % 36) as usize] as char);
        }
    }
    Ok(code)
}

/// Generates codes until `taken` reports one as free.
pub fn generate_unique_code(taken: impl Fn(&str) -> bool) -> Result<String> {
    loop {
        let code = generate_code()?;
        if !taken(&code) {
            return Ok(code);
        }
    }
}

/// Canonical form used for lookups.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
