// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Salted-challenge authentication for the control channel.
//!
//! There is no on-wire confidentiality: a client proves it knows the
//! server's configured username/password by hashing them together with a
//! server-chosen salt, the same construction `ring`'s digest API is already
//! used for elsewhere in this codebase.

use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Error, Result};

/// Generate a fresh 32-byte salt for a server-hello.
///
/// Fails with [`Error::ResourceExhausted`] if the OS RNG is unavailable,
/// rather than ever handing out a predictable salt.
pub fn generate_salt() -> Result<[u8; 32]> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; 32];
    rng.fill(&mut salt).map_err(|_| Error::ResourceExhausted)?;
    Ok(salt)
}

/// Generate a random 32-bit client-private inspector handle.
pub fn generate_handle() -> Result<u32> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes).map_err(|_| Error::ResourceExhausted)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Compute `SHA256(user || 0 || password || 0 || salt)`.
pub fn compute_auth_token(user: &str, password: &str, salt: &[u8; 32]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(user.len() + password.len() + 2 + salt.len());
    buf.extend_from_slice(user.as_bytes());
    buf.push(0);
    buf.extend_from_slice(password.as_bytes());
    buf.push(0);
    buf.extend_from_slice(salt);

    let hash = digest(&SHA256, &buf);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_ref());
    out
}

/// Verify a client-submitted token against the server's credential triple.
///
/// Constant-time comparison is not required here: both the reference
/// implementation and this port treat the salt as single-use per connection,
/// so a timing side-channel leaks nothing an attacker can replay.
pub fn verify_auth_token(user: &str, password: &str, salt: &[u8; 32], token: &[u8; 32]) -> bool {
    compute_auth_token(user, password, salt) == *token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_credentials_verify() {
        let salt = [0x11u8; 32];
        let token = compute_auth_token("u", "p", &salt);
        assert!(verify_auth_token("u", "p", &salt, &token));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let salt = [0x11u8; 32];
        let token = compute_auth_token("u", "p", &salt);
        assert!(!verify_auth_token("u", "wrong", &salt, &token));
    }

    #[test]
    fn different_salt_changes_the_token() {
        let token_a = compute_auth_token("u", "p", &[0x00; 32]);
        let token_b = compute_auth_token("u", "p", &[0x01; 32]);
        assert_ne!(token_a, token_b);
    }

    #[test]
    fn salts_are_not_all_zero() {
        let salt = generate_salt().unwrap();
        assert_ne!(salt, [0u8; 32]);
    }

    #[test]
    fn handles_vary_across_calls() {
        let a = generate_handle().unwrap();
        let b = generate_handle().unwrap();
        assert_ne!(a, b);
    }
}
