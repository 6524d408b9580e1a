use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::error::AuthError;

// Fixed argon2id cost parameters. Keeping them constant means verification
// latency does not depend on the outcome.
const MEMORY_KIB: u32 = 19_456;
const ITERATIONS: u32 = 2;
const LANES: u32 = 1;
const OUTPUT_LEN: usize = 32;

fn peppered(pepper: &str) -> Result<Argon2<'_>, AuthError> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, LANES, Some(OUTPUT_LEN))
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    Argon2::new_with_secret(
        pepper.as_bytes(),
        Algorithm::Argon2id,
        Version::V0x13,
        params,
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn hash_password(password: &str, pepper: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    peppered(pepper)?
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(e.to_string()))
}

/// Mismatches return `Ok(false)`; only a malformed stored digest is an error.
pub fn verify_password(password: &str, pepper: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(peppered(pepper)?
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEPPER: &str = "unit-test-pepper";

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("correct horse", PEPPER).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", PEPPER, &hash).unwrap());
        assert!(!verify_password("wrong horse", PEPPER, &hash).unwrap());
    }

    #[test]
    fn verification_fails_under_a_different_pepper() {
        let hash = hash_password("correct horse", PEPPER).unwrap();
        assert!(!verify_password("correct horse", "another-pepper", &hash).unwrap());
    }

    #[test]
    fn salts_make_hashes_unique() {
        let a = hash_password("same password", PEPPER).unwrap();
        let b = hash_password("same password", PEPPER).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_digest_is_an_error() {
        assert!(verify_password("anything", PEPPER, "not-a-phc-string").is_err());
    }
}
