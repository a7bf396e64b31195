use crypto::pbkdf2::{pbkdf2_check, pbkdf2_simple};
use crate::types::ApiError;

const ROUNDS: u32 = 10_000;

lazy_static! {
    // Verified against when the email is unknown, so both login failures cost the same.
    static ref DUMMY_HASH: Option<String> = pbkdf2_simple("not a password", ROUNDS).ok();
}

/// Salted pbkdf2-sha256; the salt and round count are encoded in the result.
pub fn hash(password: &str) -> Result<String, ApiError> {
    Ok(pbkdf2_simple(password, ROUNDS)?)
}

/// Constant-time check of `password` against a value produced by [`hash`].
pub fn verify(password: &str, hashed: &str) -> Result<bool, ApiError> {
    pbkdf2_check(password, hashed).map_err(|e| {
        error!("stored password hash is unreadable: {}", e);
        ApiError::Internal
    })
}

pub fn verify_dummy(password: &str) {
    if let Some(ref hashed) = *DUMMY_HASH {
        let _ = pbkdf2_check(password, hashed);
    }
}
