//! Key derivation: password → AES-256 key via PBKDF2-HMAC-SHA256

use mmdrez_core::{MmdrezError, MmdrezResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit key derived from a password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct PasswordKey {
    bytes: [u8; KEY_SIZE],
}

impl PasswordKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for PasswordKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Reject empty and whitespace-only passwords.
pub fn validate_password(password: &SecretString) -> MmdrezResult<()> {
    if password.expose_secret().trim().is_empty() {
        return Err(MmdrezError::invalid_argument(
            "password must not be empty or whitespace",
        ));
    }
    Ok(())
}

/// Derive a 256-bit key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// The password is taken as its UTF-8 bytes. The salt is stored alongside the
/// protected data and does not need to be secret.
pub fn derive_password_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    iterations: u32,
) -> MmdrezResult<PasswordKey> {
    if iterations == 0 {
        return Err(MmdrezError::invalid_argument(
            "PBKDF2 iteration count must be at least 1",
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key,
    );
    let derived = PasswordKey::from_bytes(key);
    key.zeroize();

    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmdrez_core::ErrorKind;

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("test-password-123");
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_password_key(&password, &salt, 1000).unwrap();
        let key2 = derive_password_key(&password, &salt, 1000).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passwords() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_password_key(&SecretString::from("password-a"), &salt, 1000).unwrap();
        let key2 = derive_password_key(&SecretString::from("password-b"), &salt, 1000).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different passwords must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_salts() {
        let password = SecretString::from("same-password");

        let key1 = derive_password_key(&password, &[1u8; SALT_SIZE], 1000).unwrap();
        let key2 = derive_password_key(&password, &[2u8; SALT_SIZE], 1000).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different salts must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_iterations() {
        let password = SecretString::from("same-password");
        let salt = [7u8; SALT_SIZE];

        let key1 = derive_password_key(&password, &salt, 1000).unwrap();
        let key2 = derive_password_key(&password, &salt, 1001).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = derive_password_key(&SecretString::from("pw"), &[0u8; SALT_SIZE], 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password(&SecretString::from("hunter2")).is_ok());
        for bad in ["", "   ", "\t\n"] {
            let err = validate_password(&SecretString::from(bad)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_debug_redacts() {
        let key = PasswordKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
