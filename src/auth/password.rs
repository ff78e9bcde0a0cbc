//! Password rules and Argon2id hashing for account credentials

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::KrishiError;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Reject passwords that are too short or only whitespace
pub fn check_password_strength(password: &str) -> Result<(), KrishiError> {
    if password.trim().is_empty() {
        return Err(KrishiError::Validation("Password is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(KrishiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Hash a password, returning the PHC string (salt and parameters included)
pub fn hash_password(password: &str) -> Result<String, KrishiError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| KrishiError::Auth(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, KrishiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| KrishiError::Auth(format!("Stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("green-paddy-monsoon").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("green-paddy-monsoon", &hash).unwrap());
        assert!(!verify_password("rabi-wheat-winter", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("kharif-season").unwrap();
        let b = hash_password("kharif-season").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("whatever1", "plain-text").is_err());
    }

    #[test]
    fn test_strength_rules() {
        assert!(check_password_strength("short").is_err());
        assert!(check_password_strength("        ").is_err());
        assert!(check_password_strength("long-enough").is_ok());
    }
}
