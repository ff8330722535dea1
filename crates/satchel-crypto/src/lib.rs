//! AES-256-GCM implementation of [`FieldCrypto`].
//!
//! The cipher key is derived from the configured passphrase with SHA-256;
//! each value is sealed under a fresh random 96-bit nonce and stored as
//! `base64(nonce ‖ ciphertext)`. GCM authenticates the ciphertext, so a
//! wrong passphrase always fails decryption instead of yielding garbage.

use aes_gcm::{
  Aes256Gcm, Key, Nonce,
  aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use satchel_core::provider::{FieldCrypto, ProviderError};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

fn cipher_for(passphrase: &str) -> Aes256Gcm {
  let digest = Sha256::digest(passphrase.as_bytes());
  Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest))
}

/// Stateless field cipher; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcmFieldCrypto;

impl FieldCrypto for GcmFieldCrypto {
  fn encrypt(&self, plaintext: &str, key: &str) -> Result<String, ProviderError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher_for(key)
      .encrypt(nonce, plaintext.as_bytes())
      .map_err(|_| ProviderError("encryption failed".into()))?;

    let mut wire = Vec::with_capacity(NONCE_LEN + sealed.len());
    wire.extend_from_slice(&nonce_bytes);
    wire.extend_from_slice(&sealed);
    Ok(BASE64.encode(wire))
  }

  fn decrypt(&self, ciphertext: &str, key: &str) -> Result<String, ProviderError> {
    let wire = BASE64
      .decode(ciphertext)
      .map_err(|_| ProviderError("ciphertext is not valid base64".into()))?;
    if wire.len() <= NONCE_LEN {
      return Err(ProviderError("ciphertext too short".into()));
    }
    let (nonce_bytes, sealed) = wire.split_at(NONCE_LEN);

    let plain = cipher_for(key)
      .decrypt(Nonce::from_slice(nonce_bytes), sealed)
      .map_err(|_| ProviderError("decryption failed: wrong key or corrupted value".into()))?;

    String::from_utf8(plain)
      .map_err(|_| ProviderError("decrypted value is not valid UTF-8".into()))
  }
}
