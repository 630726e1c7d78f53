//! Password hashing and verification
//!
//! Uses bcrypt with a caller-supplied work factor, fixed for a whole run.

use crate::error::SeedError;
use bcrypt::{hash, verify};

/// Hash a staff password using bcrypt
pub fn hash_password(username: &str, password: &str, cost: u32) -> Result<String, SeedError> {
    hash(password, cost).map_err(|e| SeedError::Hash {
        username: username.to_string(),
        message: e.to_string(),
    })
}

/// Verify a password against a stored hash
pub fn verify_password(username: &str, password: &str, hash: &str) -> Result<bool, SeedError> {
    verify(password, hash).map_err(|e| SeedError::Hash {
        username: username.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip() {
        let hashed = hash_password("admin", "s3cret", 4).unwrap();
        assert!(hashed.starts_with("$2"));
        assert!(verify_password("admin", "s3cret", &hashed).unwrap());
        assert!(!verify_password("admin", "wrong", &hashed).unwrap());
    }

    #[test]
    fn test_invalid_cost_is_an_error() {
        assert!(matches!(hash_password("admin", "s3cret", 2), Err(SeedError::Hash { .. })));
    }
}
