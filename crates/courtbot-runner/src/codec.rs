//! AES-256-GCM phone codec with a synthetic IV.
//!
//! The nonce is the first 12 bytes of `HMAC-SHA256(key, plaintext)`, so a
//! given number always encrypts to the same bytes and the store can match on
//! ciphertext. Stored form is `nonce || ciphertext || tag`. Decryption
//! re-derives the nonce from the recovered plaintext and rejects a mismatch.
//!
//! Equal plaintexts are visible as equal ciphertexts; that is the point, and
//! the only thing an observer of the database learns.

use aes_gcm::{
  Aes256Gcm, KeyInit, Nonce,
  aead::Aead,
};
use courtbot_core::{
  Error, Result,
  codec::{EncryptedPhone, PhoneCodec},
};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

pub struct AesPhoneCodec {
  key: [u8; KEY_LEN],
}

impl AesPhoneCodec {
  pub fn new(key: [u8; KEY_LEN]) -> Self { Self { key } }

  /// Build a codec from a 64-character hex key.
  pub fn from_hex_key(hex_key: &str) -> Result<Self> {
    let bytes = hex::decode(hex_key.trim())
      .map_err(|e| Error::Codec(format!("encryption key is not hex: {e}")))?;
    let key: [u8; KEY_LEN] = bytes
      .try_into()
      .map_err(|b: Vec<u8>| Error::Codec(format!("encryption key is {} bytes, want {KEY_LEN}", b.len())))?;
    Ok(Self::new(key))
  }

  /// A fresh random key, hex encoded.
  pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    hex::encode(key)
  }

  fn cipher(&self) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(&self.key).map_err(|_| Error::Codec("invalid AES key".into()))
  }

  fn synthetic_nonce(&self, plaintext: &[u8]) -> Result<[u8; NONCE_LEN]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
      .map_err(|_| Error::Codec("invalid HMAC key".into()))?;
    mac.update(plaintext);
    let digest = mac.finalize().into_bytes();
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&digest[..NONCE_LEN]);
    Ok(nonce)
  }
}

impl PhoneCodec for AesPhoneCodec {
  fn encrypt(&self, phone: &str) -> Result<EncryptedPhone> {
    let nonce = self.synthetic_nonce(phone.as_bytes())?;
    let sealed = self
      .cipher()?
      .encrypt(Nonce::from_slice(&nonce), phone.as_bytes())
      .map_err(|_| Error::Codec("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(EncryptedPhone::from_bytes(out))
  }

  fn decrypt(&self, phone: &EncryptedPhone) -> Result<String> {
    let bytes = phone.as_bytes();
    if bytes.len() < NONCE_LEN + TAG_LEN {
      return Err(Error::Codec("ciphertext too short".into()));
    }
    let (nonce, sealed) = bytes.split_at(NONCE_LEN);

    let plain = self
      .cipher()?
      .decrypt(Nonce::from_slice(nonce), sealed)
      .map_err(|_| Error::Codec("authentication failed".into()))?;
    if self.synthetic_nonce(&plain)? != nonce {
      return Err(Error::Codec("nonce does not match plaintext".into()));
    }
    String::from_utf8(plain).map_err(|_| Error::Codec("plaintext is not UTF-8".into()))
  }
}
