//! Credential vault
//!
//! AES-256-GCM with a 16-byte random nonce per encryption and the associated
//! data `email-config`. The 16-byte tag is stored apart from the ciphertext and
//! every field is lowercase hex.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use core_config::{ConfigError, FromEnv, env_optional};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type Cipher = AesGcm<Aes256, U16>;

const ASSOCIATED_DATA: &[u8] = b"email-config";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("Refusing to encrypt an empty secret")]
    EmptyPlaintext,

    #[error("Encrypted secret is missing its {0}")]
    MissingField(&'static str),

    #[error("Encrypted secret has a malformed {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("Encryption failed")]
    Encryption,

    #[error("Authentication tag mismatch (tampered data or wrong key)")]
    TagMismatch,

    #[error("Decrypted secret is not valid UTF-8")]
    InvalidUtf8,
}

/// Hex-encoded AEAD output as stored in `email_configs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// `ENCRYPTION_KEY`: 64 hex characters. Optional; see [`CredentialCipher::from_hex_key`].
#[derive(Clone, Default)]
pub struct VaultConfig {
    pub encryption_key: Option<String>,
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl FromEnv for VaultConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            encryption_key: env_optional("ENCRYPTION_KEY"),
        })
    }
}

/// Encrypts and decrypts sender app passwords with one process-wide key.
///
/// Constructed once at startup and cloned into whatever needs it.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Arc<Cipher>,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Arc::new(Cipher::new(Key::<Cipher>::from_slice(&key))),
        }
    }

    /// Fresh random key. Returns the cipher and the key as hex.
    pub fn generate() -> (Self, String) {
        let key = Cipher::generate_key(&mut OsRng);
        let hex = const_hex::encode(key);
        let cipher = Self {
            cipher: Arc::new(Cipher::new(&key)),
        };
        (cipher, hex)
    }

    /// Build from the configured key, falling back to a generated one.
    ///
    /// Never fails: a missing or unusable key is logged and replaced, and data
    /// encrypted under the replacement is lost on restart unless the operator
    /// persists the logged value.
    pub fn from_hex_key(raw: Option<&str>) -> Self {
        match raw.map(decode_key) {
            Some(Ok(key)) => {
                tracing::info!("Credential cipher initialised from ENCRYPTION_KEY");
                Self::new(key)
            }
            Some(Err(reason)) => {
                tracing::error!(
                    reason = %reason,
                    "ENCRYPTION_KEY is unusable, expected 64 hex characters (32 bytes)"
                );
                Self::generated()
            }
            None => Self::generated(),
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self::from_hex_key(config.encryption_key.as_deref())
    }

    fn generated() -> Self {
        let (cipher, hex) = Self::generate();
        tracing::warn!(
            generated_key = %hex,
            "No usable ENCRYPTION_KEY; generated one for this process. Set ENCRYPTION_KEY to this value or stored credentials become unreadable after restart"
        );
        cipher
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, VaultError> {
        if plaintext.is_empty() {
            return Err(VaultError::EmptyPlaintext);
        }

        let nonce = Cipher::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| VaultError::Encryption)?;

        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedSecret {
            ciphertext: const_hex::encode(&sealed),
            iv: const_hex::encode(nonce),
            auth_tag: const_hex::encode(&tag),
        })
    }

    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, VaultError> {
        let mut sealed = decode_field("ciphertext", &secret.ciphertext, None)?;
        let iv = decode_field("iv", &secret.iv, Some(IV_LEN))?;
        let tag = decode_field("authTag", &secret.auth_tag, Some(TAG_LEN))?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::<U16>::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| VaultError::TagMismatch)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::InvalidUtf8)
    }
}

fn decode_key(raw: &str) -> Result<[u8; KEY_LEN], String> {
    let bytes = const_hex::decode(raw.trim()).map_err(|e| e.to_string())?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| format!("decodes to {} bytes", bytes.len()))
}

fn decode_field(
    field: &'static str,
    value: &str,
    expected_len: Option<usize>,
) -> Result<Vec<u8>, VaultError> {
    if value.is_empty() {
        return Err(VaultError::MissingField(field));
    }

    let bytes = const_hex::decode(value).map_err(|e| VaultError::MalformedField {
        field,
        reason: e.to_string(),
    })?;

    match expected_len {
        Some(len) if bytes.len() != len => Err(VaultError::MalformedField {
            field,
            reason: format!("expected {} bytes, got {}", len, bytes.len()),
        }),
        _ => Ok(bytes),
    }
}
