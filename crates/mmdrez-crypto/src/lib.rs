//! mmdrez-crypto: hybrid file encryption engine
//!
//! Three independent, stateless, synchronous components:
//!
//! - **Key management** ([`keypair`]): RSA key pair generation; the private key
//!   is stored PKCS#8 PEM, AES-256-GCM encrypted under a PBKDF2-HMAC-SHA256
//!   password key.
//! - **Hybrid file encryption** ([`container`]): a fresh 256-bit content key per
//!   file, wrapped with RSA-OAEP-SHA256, then chunked AES-256-GCM.
//! - **Secure wipe** ([`wipe`]): best-effort rename, random overwrite, delete.
//!
//! Container layout (all integers big-endian):
//! ```text
//! MAGIC(6) | VERSION(1) | WrappedKeyLen(2) | WrappedKey | BaseNonce(8) |
//! NameLen(2) | Name(UTF-8) | ChunkSize(4) |
//! { ChunkLen(4) | Ciphertext(ChunkLen) | Tag(16) }*
//!
//! chunk i: nonce = BaseNonce || i (4 bytes BE)
//!          AAD   = Name       || i (4 bytes BE)
//! ```
//!
//! Protected private key layout:
//! ```text
//! MAGIC(6) | VERSION(1) | Salt(16) | Iterations(4) | IV(12) | Ciphertext | Tag(16)
//! ```

pub mod chunk;
pub mod container;
pub mod header;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod names;
pub mod wipe;

pub use container::{
    decrypt_file, decrypt_path, decrypt_stream, default_output_path, encrypt_file, encrypt_path,
    encrypt_stream, inspect, ContainerInfo, DecryptedFile, PathOutcome, StreamSummary,
};
pub use header::ContainerHeader;
pub use kdf::{derive_password_key, PasswordKey};
pub use keypair::{
    change_password, decrypt_private_key, generate_key_pair, load_private_key, load_public_key,
    protect_private_key, write_key_files, write_private_key_file, GeneratedKeyPair, KeyGenParams,
    ProtectedPrivateKey,
};
pub use keys::{
    generate_content_key, parse_private_key, parse_public_key, unwrap_key, wrap_key, ContentKey,
};
pub use names::sanitize_file_name;
pub use wipe::{wipe_file, WipeOptions};

pub use mmdrez_core::{ErrorKind, MmdrezError, MmdrezResult};

/// Format tag shared by containers and protected private keys
pub const MAGIC: &[u8; 6] = b"MMDREZ";

/// Current on-disk format version
pub const VERSION: u8 = 1;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Random per-file nonce prefix; the chunk counter fills the remaining 4 bytes
pub const BASE_NONCE_SIZE: usize = 8;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// PBKDF2 salt size
pub const SALT_SIZE: usize = 16;

pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Largest chunk size accepted on either side; bounds per-chunk allocation.
pub const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

pub const DEFAULT_KEY_BITS: usize = 4096;

pub const DEFAULT_ITERATIONS: u32 = 200_000;

/// Container file extension (without the dot)
pub const CONTAINER_EXTENSION: &str = "mmdrez";
