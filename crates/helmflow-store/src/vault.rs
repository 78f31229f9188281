//! AES-256-GCM sealing of secret values at rest
//!
//! Sealed values are stored as `sealed:` + base64(nonce || ciphertext).
//! When no state key is configured the vault degrades to passthrough, so a
//! development setup works without any key material. Unsealing a sealed
//! value without the key is a hard error.

use crate::error::{Result, StoreError};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use helmflow_core::ResourceRecord;

/// Environment variable holding the base64-encoded 32-byte state key
pub const STATE_KEY_ENV: &str = "HELMFLOW_STATE_KEY";

const SEALED_PREFIX: &str = "sealed:";
const NONCE_LEN: usize = 12;

/// Seals and unseals the secret-bearing fields of a record
#[derive(Clone)]
pub struct SecretVault {
    key: Option<[u8; 32]>,
}

impl SecretVault {
    /// Build from `HELMFLOW_STATE_KEY`, passthrough when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var(STATE_KEY_ENV) {
            Ok(encoded) => {
                let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                    StoreError::VaultError(format!("{STATE_KEY_ENV} is not valid base64: {e}"))
                })?;
                let key: [u8; 32] = bytes.try_into().map_err(|_| {
                    StoreError::VaultError(format!("{STATE_KEY_ENV} must decode to 32 bytes"))
                })?;
                Ok(Self::with_key(key))
            }
            Err(_) => Ok(Self::disabled()),
        }
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key: Some(key) }
    }

    /// Passthrough vault; values are stored as-is
    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Seal one value. A value that already unseals under the current key
    /// passes through unchanged so a record loaded from disk can be
    /// re-saved without double sealing. A plaintext that merely starts
    /// with the `sealed:` marker is refused at intake; stored as-is it
    /// would fail every later unseal.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        if plaintext.starts_with(SEALED_PREFIX) {
            return match self.unseal(plaintext) {
                Ok(_) => Ok(plaintext.to_string()),
                Err(_) => Err(StoreError::VaultError(format!(
                    "value starts with {SEALED_PREFIX} but is not sealed data; refusing to store it"
                ))),
            };
        }
        let Some(key) = &self.key else {
            return Ok(plaintext.to_string());
        };

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| StoreError::VaultError(format!("AES-GCM encrypt: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(combined)))
    }

    /// Unseal one value. Plain values pass through unchanged.
    pub fn unseal(&self, value: &str) -> Result<String> {
        let Some(encoded) = value.strip_prefix(SEALED_PREFIX) else {
            return Ok(value.to_string());
        };
        let Some(key) = &self.key else {
            return Err(StoreError::VaultError(format!(
                "sealed value present but {STATE_KEY_ENV} is not set"
            )));
        };

        let combined = STANDARD
            .decode(encoded)
            .map_err(|e| StoreError::VaultError(format!("base64 decode: {e}")))?;
        if combined.len() <= NONCE_LEN {
            return Err(StoreError::VaultError("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| StoreError::VaultError(format!("AES-GCM decrypt: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| StoreError::VaultError(format!("decrypted value is not UTF-8: {e}")))
    }

    /// Seal every secret-bearing field of a record in place
    pub fn seal_record(&self, record: &mut ResourceRecord) -> Result<()> {
        for value in record.secret_data.values_mut() {
            *value = self.seal(value)?;
        }
        if let Some(git) = record.git.as_mut()
            && let Some(token) = git.token.as_mut()
        {
            *token = self.seal(token)?;
        }
        if let Some(api) = record.api.as_mut()
            && let Some(kubeconfig) = api.kubeconfig.as_mut()
        {
            *kubeconfig = self.seal(kubeconfig)?;
        }
        Ok(())
    }

    /// Unseal every secret-bearing field of a record in place
    pub fn unseal_record(&self, record: &mut ResourceRecord) -> Result<()> {
        for value in record.secret_data.values_mut() {
            *value = self.unseal(value)?;
        }
        if let Some(git) = record.git.as_mut()
            && let Some(token) = git.token.as_mut()
        {
            *token = self.unseal(token)?;
        }
        if let Some(api) = record.api.as_mut()
            && let Some(kubeconfig) = api.kubeconfig.as_mut()
        {
            *kubeconfig = self.unseal(kubeconfig)?;
        }
        Ok(())
    }
}
