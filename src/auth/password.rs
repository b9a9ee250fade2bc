//! Credential hashing for `users.password_hash`.
//!
//! Stored values are Argon2id PHC strings (`$argon2id$v=19$...`), so the salt
//! and cost parameters travel with each user's row and older rows keep
//! verifying if the defaults change.

use anyhow::anyhow;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Hash a sign-up password into the PHC string stored on the user row.
/// Every call draws a fresh salt, so two users with the same password get
/// different stored values.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "could not hash user password");
            anyhow!("password hashing failed: {e}")
        })
}

/// Check a login attempt against a stored hash.
///
/// `Ok(false)` means the password does not match. A stored value that is not
/// a readable PHC string is an `Err`: that is a broken user row, not a bad
/// login.
pub fn verify_password(plain: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(error = %e, "stored password hash is unreadable");
        anyhow!("stored password hash is unreadable: {e}")
    })?;

    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, algorithm = %parsed.algorithm, "password verification failed");
            Err(anyhow!("password verification failed: {e}"))
        }
    }
}
