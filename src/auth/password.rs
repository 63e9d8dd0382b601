//! Password hashing and verification using Argon2id.
//!
//! Only PHC-format hash strings are ever persisted; the plaintext lives
//! in a [`Password`] wrapper that zeroizes its memory on drop.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::{RealtextError, Result};

/// Parameters for Argon2id password hashing
const ARGON2_PARAMS: argon2::Params = match argon2::Params::new(
    19 * 1024, // 19 MiB memory cost
    2,         // 2 iterations
    1,         // 1 thread (single-threaded)
    Some(32),  // 32-byte output length
) {
    Ok(params) => params,
    Err(_) => panic!("Invalid Argon2 parameters"),
};

/// A plaintext password in transit between the form and the hasher.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    /// Create a new password from a string
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// Get password as bytes
    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Get password as a string slice
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if password is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(..)")
    }
}

/// Hashes a password into a PHC-format string for storage.
pub fn hash_password(password: &Password) -> Result<String> {
    if password.is_empty() {
        return Err(RealtextError::credential("Password cannot be empty"));
    }

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ARGON2_PARAMS,
    );
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| RealtextError::credential(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

/// Verifies a password against a stored PHC-format hash.
///
/// Returns `Ok(false)` on mismatch; errors are reserved for malformed
/// stored hashes.
pub fn verify_password(password: &Password, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| RealtextError::credential(format!("Malformed stored hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(RealtextError::credential(format!(
            "Failed to verify password: {}",
            e
        ))),
    }
}
