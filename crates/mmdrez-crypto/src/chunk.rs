//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Each chunk is sealed in place; the ciphertext has the plaintext's length and
//! the 16-byte tag is kept separately so it can be written after it:
//! ```text
//! nonce(i) = base_nonce (8 bytes) || i (4 bytes, big-endian)
//! AAD(i)   = file_name (UTF-8)    || i (4 bytes, big-endian)
//! ```
//!
//! The counter makes every nonce in a file unique for up to 2^32 chunks. The AAD
//! binds each chunk to its position and to the declared filename, preventing
//! chunk reordering and cross-file substitution.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use mmdrez_core::{MmdrezError, MmdrezResult};
use zeroize::Zeroizing;

use crate::keys::ContentKey;
use crate::{BASE_NONCE_SIZE, NONCE_SIZE, TAG_SIZE};

/// AES-256-GCM cipher bound to one content key.
pub struct ChunkCipher {
    cipher: Aes256Gcm,
    base_nonce: [u8; BASE_NONCE_SIZE],
}

impl ChunkCipher {
    pub fn new(key: &ContentKey, base_nonce: [u8; BASE_NONCE_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            base_nonce,
        }
    }

    /// Encrypt `buf` in place as chunk `index`, returning the tag.
    pub fn seal(
        &self,
        index: u32,
        file_name: &[u8],
        buf: &mut [u8],
    ) -> MmdrezResult<[u8; TAG_SIZE]> {
        let nonce = chunk_nonce(&self.base_nonce, index);
        let aad = chunk_aad(file_name, index);

        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce[..]), &aad, buf)
            .map_err(|e| {
                MmdrezError::invalid_argument(format!("chunk {index} encryption failed: {e}"))
            })?;

        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Decrypt `buf` in place as chunk `index`.
    ///
    /// On failure `buf` is left holding unauthenticated bytes and must not be
    /// used; the error is always [`MmdrezError::AuthenticationFailure`].
    pub fn open(
        &self,
        index: u32,
        file_name: &[u8],
        buf: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> MmdrezResult<()> {
        let nonce = chunk_nonce(&self.base_nonce, index);
        let aad = chunk_aad(file_name, index);

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce[..]),
                &aad,
                buf,
                Tag::from_slice(tag),
            )
            .map_err(|_| MmdrezError::AuthenticationFailure)
    }
}

/// nonce = base_nonce (8 bytes) || index (4 bytes BE)
pub fn chunk_nonce(base_nonce: &[u8; BASE_NONCE_SIZE], index: u32) -> Zeroizing<[u8; NONCE_SIZE]> {
    let mut nonce = Zeroizing::new([0u8; NONCE_SIZE]);
    nonce[..BASE_NONCE_SIZE].copy_from_slice(base_nonce);
    nonce[BASE_NONCE_SIZE..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// AAD = file_name || index (4 bytes BE)
pub fn chunk_aad(file_name: &[u8], index: u32) -> Zeroizing<Vec<u8>> {
    let mut aad = Zeroizing::new(Vec::with_capacity(file_name.len() + 4));
    aad.extend_from_slice(file_name);
    aad.extend_from_slice(&index.to_be_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_content_key;
    use mmdrez_core::ErrorKind;

    const BASE: [u8; BASE_NONCE_SIZE] = [0x11; BASE_NONCE_SIZE];

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = ChunkCipher::new(&generate_content_key(), BASE);
        let plaintext = b"hello, encrypted world!";

        let mut buf = plaintext.to_vec();
        let tag = cipher.seal(0, b"notes.txt", &mut buf).unwrap();
        assert_eq!(buf.len(), plaintext.len(), "ciphertext keeps plaintext length");
        assert_ne!(&buf[..], &plaintext[..]);

        cipher.open(0, b"notes.txt", &mut buf, &tag).unwrap();
        assert_eq!(&buf[..], &plaintext[..]);
    }

    #[test]
    fn test_seal_open_empty() {
        let cipher = ChunkCipher::new(&generate_content_key(), BASE);

        let mut buf = Vec::new();
        let tag = cipher.seal(0, b"", &mut buf).unwrap();
        cipher.open(0, b"", &mut buf, &tag).unwrap();

        assert!(buf.is_empty());
    }

    #[test]
    fn test_open_wrong_key() {
        let sealer = ChunkCipher::new(&generate_content_key(), BASE);
        let opener = ChunkCipher::new(&generate_content_key(), BASE);

        let mut buf = b"secret data".to_vec();
        let tag = sealer.seal(0, b"f", &mut buf).unwrap();

        let err = opener.open(0, b"f", &mut buf, &tag).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[test]
    fn test_open_wrong_chunk_index() {
        let cipher = ChunkCipher::new(&generate_content_key(), BASE);

        let mut buf = b"secret data".to_vec();
        let tag = cipher.seal(0, b"f", &mut buf).unwrap();

        assert!(
            cipher.open(1, b"f", &mut buf, &tag).is_err(),
            "wrong chunk index must fail (nonce and AAD mismatch)"
        );
    }

    #[test]
    fn test_open_wrong_file_name() {
        let cipher = ChunkCipher::new(&generate_content_key(), BASE);

        let mut buf = b"secret data".to_vec();
        let tag = cipher.seal(0, b"a.txt", &mut buf).unwrap();

        assert!(
            cipher.open(0, b"b.txt", &mut buf, &tag).is_err(),
            "wrong file name must fail (AAD mismatch)"
        );
    }

    #[test]
    fn test_open_wrong_base_nonce() {
        let key = generate_content_key();
        let sealer = ChunkCipher::new(&key, BASE);
        let opener = ChunkCipher::new(&key, [0x22; BASE_NONCE_SIZE]);

        let mut buf = b"secret data".to_vec();
        let tag = sealer.seal(3, b"f", &mut buf).unwrap();

        assert!(opener.open(3, b"f", &mut buf, &tag).is_err());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let cipher = ChunkCipher::new(&generate_content_key(), BASE);

        let mut buf = b"secret data".to_vec();
        let tag = cipher.seal(0, b"f", &mut buf).unwrap();
        buf[2] ^= 0x01;

        assert!(cipher.open(0, b"f", &mut buf, &tag).is_err(), "tampered ciphertext must fail");
    }

    #[test]
    fn test_tampered_tag() {
        let cipher = ChunkCipher::new(&generate_content_key(), BASE);

        let mut buf = b"secret data".to_vec();
        let mut tag = cipher.seal(0, b"f", &mut buf).unwrap();
        tag[15] ^= 0x80;

        assert!(cipher.open(0, b"f", &mut buf, &tag).is_err(), "tampered tag must fail");
    }

    #[test]
    fn test_nonce_layout() {
        let nonce = chunk_nonce(&[1, 2, 3, 4, 5, 6, 7, 8], 0x0A0B_0C0D);
        assert_eq!(*nonce, [1, 2, 3, 4, 5, 6, 7, 8, 0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_aad_layout() {
        let aad = chunk_aad("ä.txt".as_bytes(), 2);
        let mut expected = "ä.txt".as_bytes().to_vec();
        expected.extend_from_slice(&[0, 0, 0, 2]);
        assert_eq!(*aad, expected);
    }
}
