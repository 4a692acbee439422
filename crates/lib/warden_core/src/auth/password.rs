//! Password hashing via bcrypt.

use tracing::debug;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10, random salt).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AuthError::Server(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt digest. A malformed digest never
/// matches.
pub fn verify_password(password: &str, digest: &str) -> bool {
    match bcrypt::verify(password, digest) {
        Ok(matches) => matches,
        Err(e) => {
            debug!(error = %e, "bcrypt verify failed");
            false
        }
    }
}
