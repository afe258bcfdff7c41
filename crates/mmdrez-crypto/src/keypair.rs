//! RSA key pair generation and password-protected private key storage
//!
//! Protected private key format (binary, integers big-endian):
//! ```text
//! MAGIC(6) | VERSION(1) | Salt(16) | Iterations(4) | IV(12) | Ciphertext | Tag(16)
//! ```
//! The ciphertext is the PKCS#8 PEM text of the private key, AES-256-GCM
//! encrypted (no associated data) under a PBKDF2-HMAC-SHA256 key. The public
//! key is stored separately as SubjectPublicKeyInfo PEM.

use std::io::Write;
use std::path::Path;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use mmdrez_core::{MmdrezError, MmdrezResult};
use rand::RngCore;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, Zeroizing};

use crate::kdf::{derive_password_key, validate_password};
use crate::{DEFAULT_ITERATIONS, DEFAULT_KEY_BITS, MAGIC, NONCE_SIZE, SALT_SIZE, TAG_SIZE, VERSION};

/// Smallest accepted RSA modulus
pub const MIN_KEY_BITS: usize = 2048;

/// Largest accepted RSA modulus
pub const MAX_KEY_BITS: usize = 16384;

/// Fixed-size fields of a protected key: magic, version, salt, iterations, IV, tag
pub const MIN_PROTECTED_LEN: usize = MAGIC.len() + 1 + SALT_SIZE + 4 + NONCE_SIZE + TAG_SIZE;

/// Key pair generation parameters
#[derive(Debug, Clone)]
pub struct KeyGenParams {
    /// RSA modulus size in bits (default: 4096)
    pub key_bits: usize,
    /// PBKDF2-HMAC-SHA256 iterations (default: 200000)
    pub iterations: u32,
}

impl Default for KeyGenParams {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// A freshly generated key pair, ready to be persisted.
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    /// SubjectPublicKeyInfo PEM
    pub public_key_pem: String,
    /// Serialized [`ProtectedPrivateKey`]
    pub protected_private_key: Vec<u8>,
}

/// Parsed protected private key record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPrivateKey {
    pub salt: [u8; SALT_SIZE],
    pub iterations: u32,
    pub iv: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl ProtectedPrivateKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_PROTECTED_LEN + self.ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iterations.to_be_bytes());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    pub fn from_bytes(data: &[u8]) -> MmdrezResult<Self> {
        if data.len() < MIN_PROTECTED_LEN {
            return Err(MmdrezError::invalid_format(format!(
                "protected key truncated: {} bytes (minimum {})",
                data.len(),
                MIN_PROTECTED_LEN
            )));
        }

        let (magic, rest) = data.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(MmdrezError::invalid_format(
                "not a protected private key (magic mismatch)",
            ));
        }
        let (version, rest) = rest.split_at(1);
        if version[0] != VERSION {
            return Err(MmdrezError::invalid_format(format!(
                "unsupported protected key version {}",
                version[0]
            )));
        }

        let (salt, rest) = rest.split_at(SALT_SIZE);
        let (iterations, rest) = rest.split_at(4);
        let (iv, rest) = rest.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

        let iterations =
            u32::from_be_bytes([iterations[0], iterations[1], iterations[2], iterations[3]]);
        if iterations == 0 {
            return Err(MmdrezError::invalid_format("iteration count is zero"));
        }
        if ciphertext.is_empty() {
            return Err(MmdrezError::invalid_format("no ciphertext present"));
        }

        let mut record = Self {
            salt: [0u8; SALT_SIZE],
            iterations,
            iv: [0u8; NONCE_SIZE],
            ciphertext: ciphertext.to_vec(),
            tag: [0u8; TAG_SIZE],
        };
        record.salt.copy_from_slice(salt);
        record.iv.copy_from_slice(iv);
        record.tag.copy_from_slice(tag);
        Ok(record)
    }
}

/// Generate an RSA key pair and protect the private half with `password`.
///
/// Fresh salt, IV and key pair on every call.
pub fn generate_key_pair(
    password: &SecretString,
    params: &KeyGenParams,
) -> MmdrezResult<GeneratedKeyPair> {
    validate_password(password)?;
    if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&params.key_bits) {
        return Err(MmdrezError::invalid_argument(format!(
            "key size {} outside {MIN_KEY_BITS}..={MAX_KEY_BITS} bits",
            params.key_bits
        )));
    }
    if params.iterations == 0 {
        return Err(MmdrezError::invalid_argument(
            "PBKDF2 iteration count must be at least 1",
        ));
    }

    tracing::debug!(key_bits = params.key_bits, "generating RSA key pair");
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), params.key_bits).map_err(|e| {
        MmdrezError::invalid_argument(format!("RSA key generation failed: {e}"))
    })?;
    let public = RsaPublicKey::from(&private);

    let public_key_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| MmdrezError::invalid_argument(format!("public key encoding failed: {e}")))?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| MmdrezError::invalid_argument(format!("private key encoding failed: {e}")))?;

    let protected_private_key = protect_private_key(password, &private_pem, params.iterations)?;

    tracing::info!(
        key_bits = params.key_bits,
        iterations = params.iterations,
        "key pair generated"
    );
    Ok(GeneratedKeyPair {
        public_key_pem,
        protected_private_key,
    })
}

/// Encrypt a private key's PEM text under `password`, producing a serialized
/// [`ProtectedPrivateKey`] with fresh salt and IV.
pub fn protect_private_key(
    password: &SecretString,
    private_key_pem: &str,
    iterations: u32,
) -> MmdrezResult<Vec<u8>> {
    validate_password(password)?;

    let mut salt = [0u8; SALT_SIZE];
    let mut iv = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let key = derive_password_key(password, &salt, iterations)?;
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    drop(key);

    let mut buf = Zeroizing::new(private_key_pem.as_bytes().to_vec());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buf)
        .map_err(|e| MmdrezError::invalid_argument(format!("private key encryption failed: {e}")))?;

    let mut record = ProtectedPrivateKey {
        salt,
        iterations,
        iv,
        ciphertext: std::mem::take(&mut *buf),
        tag: [0u8; TAG_SIZE],
    };
    record.tag.copy_from_slice(&tag);

    Ok(record.to_bytes())
}

/// Recover the private key PEM from a protected blob.
///
/// A wrong password and a corrupted blob are both reported as
/// [`MmdrezError::AuthenticationFailure`].
pub fn decrypt_private_key(
    password: &SecretString,
    protected: &[u8],
) -> MmdrezResult<SecretString> {
    validate_password(password)?;
    let record = ProtectedPrivateKey::from_bytes(protected)?;

    let key = derive_password_key(password, &record.salt, record.iterations)?;
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    drop(key);

    let mut buf = Zeroizing::new(record.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&record.iv),
            b"",
            &mut buf,
            Tag::from_slice(&record.tag),
        )
        .map_err(|_| MmdrezError::AuthenticationFailure)?;

    match String::from_utf8(std::mem::take(&mut *buf)) {
        Ok(pem) => Ok(SecretString::from(pem)),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(MmdrezError::invalid_format("protected key plaintext is not UTF-8"))
        }
    }
}

/// Re-protect a private key under a new password. The old blob is not
/// modified; the result has fresh salt and IV.
pub fn change_password(
    old_password: &SecretString,
    new_password: &SecretString,
    protected: &[u8],
    iterations: u32,
) -> MmdrezResult<Vec<u8>> {
    let pem = decrypt_private_key(old_password, protected)?;
    protect_private_key(new_password, pem.expose_secret(), iterations)
}

/// Write the public key PEM and the protected private key.
///
/// Each file is written to a temporary sibling and renamed into place; the
/// private key file is created with mode 0600 on Unix.
pub fn write_key_files(
    pair: &GeneratedKeyPair,
    public_path: &Path,
    private_path: &Path,
) -> MmdrezResult<()> {
    write_atomic(public_path, pair.public_key_pem.as_bytes(), false)?;
    write_private_key_file(&pair.protected_private_key, private_path)?;
    tracing::info!(
        public = %public_path.display(),
        private = %private_path.display(),
        "key files written"
    );
    Ok(())
}

/// Atomically replace the protected private key file (mode 0600 on Unix).
pub fn write_private_key_file(protected: &[u8], path: &Path) -> MmdrezResult<()> {
    write_atomic(path, protected, true)
}

/// Read a public key PEM file.
pub fn load_public_key(path: &Path) -> MmdrezResult<String> {
    if !path.is_file() {
        return Err(MmdrezError::NotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Read and decrypt a protected private key file.
pub fn load_private_key(password: &SecretString, path: &Path) -> MmdrezResult<SecretString> {
    validate_password(password)?;
    if !path.is_file() {
        return Err(MmdrezError::NotFound(path.to_path_buf()));
    }
    let data = Zeroizing::new(std::fs::read(path)?);
    decrypt_private_key(password, &data)
}

fn write_atomic(path: &Path, data: &[u8], private: bool) -> MmdrezResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    if private {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }
    }
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| MmdrezError::Io(e.error))?;
    Ok(())
}
