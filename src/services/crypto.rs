// Credential Vault
// AES-256-GCM encryption for provider tokens at rest. Decryption never
// fails: anything that does not open as ciphertext is treated as a legacy
// plaintext token and returned unchanged, so pre-encryption rows keep
// working during migration.

use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("No encryption key configured")]
    KeyMissing,

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptFailed,
}

impl From<VaultError> for crate::utils::TransferError {
    fn from(err: VaultError) -> Self {
        crate::utils::TransferError::Database(format!("credential vault: {}", err))
    }
}

// =============================================================================
// CREDENTIAL VAULT
// =============================================================================

pub struct CredentialVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialVault {
    /// Build the vault from a base64-encoded 32-byte key. A missing or
    /// malformed key is a startup-time configuration error.
    pub fn new(key_b64: &str) -> Result<Self, VaultError> {
        if key_b64.trim().is_empty() {
            return Err(VaultError::KeyMissing);
        }

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(key_b64)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| VaultError::InvalidKey("key must be exactly 32 bytes".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Vault configured from the process-wide key
    pub fn from_config() -> Result<Self, VaultError> {
        Self::new(&crate::app_config::config().token_encryption_key)
    }

    /// Encrypt a token for storage: base64(nonce || ciphertext || tag).
    /// Empty input passes through empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::EncryptFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| VaultError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + buffer.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&buffer);
        Ok(base64::engine::general_purpose::STANDARD.encode(out))
    }

    /// Decrypt a stored token. Values that fail base64 decoding, are too
    /// short, fail authentication, or are not UTF-8 are returned unchanged
    /// as legacy plaintext.
    pub fn decrypt(&self, stored: &str) -> String {
        if stored.is_empty() {
            return String::new();
        }

        let decoded = match base64::engine::general_purpose::STANDARD.decode(stored) {
            Ok(bytes) => bytes,
            Err(_) => return stored.to_string(),
        };

        if decoded.len() <= NONCE_LEN + AES_256_GCM.tag_len() {
            return stored.to_string();
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&decoded[..NONCE_LEN]);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = decoded[NONCE_LEN..].to_vec();
        match self.key.open_in_place(nonce, Aad::empty(), &mut buffer) {
            Ok(plaintext) => match std::str::from_utf8(plaintext) {
                Ok(s) => s.to_string(),
                Err(_) => stored.to_string(),
            },
            Err(_) => stored.to_string(),
        }
    }
}
