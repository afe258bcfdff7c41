use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MmdrezError, MmdrezResult};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MmdrezConfig {
    pub keys: KeysConfig,
    pub encrypt: EncryptConfig,
    pub wipe: WipeConfig,
    pub log: LogConfig,
}

impl MmdrezConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> MmdrezResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> MmdrezResult<Self> {
        toml::from_str(content)
            .map_err(|e| MmdrezError::invalid_argument(format!("parsing config: {e}")))
    }
}

/// Key pair generation and key file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// RSA modulus size in bits (default: 4096)
    pub key_bits: usize,
    /// PBKDF2-HMAC-SHA256 iteration count for new protected keys (default: 200000)
    pub pbkdf2_iterations: u32,
    /// Public key PEM file (default: public.pem)
    pub public_key_path: PathBuf,
    /// Password-protected private key file (default: private.enc)
    pub private_key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptConfig {
    /// Plaintext bytes per chunk (default: 65536)
    pub chunk_size: u32,
    /// Container file extension, without the dot
    pub extension: String,
    /// Securely wipe the plaintext after a successful encryption
    pub wipe_original: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WipeConfig {
    /// Overwrite passes (values below 1 are raised to 1)
    pub passes: u32,
    /// Random buffer size in bytes (values below 4096 are raised to 4096)
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            key_bits: 4096,
            pbkdf2_iterations: 200_000,
            public_key_path: PathBuf::from("public.pem"),
            private_key_path: PathBuf::from("private.enc"),
        }
    }
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            extension: "mmdrez".into(),
            wipe_original: false,
        }
    }
}

impl Default for WipeConfig {
    fn default() -> Self {
        Self {
            passes: 3,
            buffer_size: 64 * 1024,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
