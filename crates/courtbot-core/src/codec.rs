//! Phone number encryption boundary.
//!
//! Phone numbers are stored encrypted. The codec must be deterministic (the
//! same plaintext always yields the same ciphertext) so the store can look up
//! and group requests by phone without decrypting every row.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Ciphertext of a phone number, as produced by a [`PhoneCodec`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncryptedPhone(Vec<u8>);

impl EncryptedPhone {
  pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self { Self(bytes.into()) }

  pub fn as_bytes(&self) -> &[u8] { &self.0 }
}

// Ciphertext is opaque; keep it out of debug output beyond a short prefix.
impl fmt::Debug for EncryptedPhone {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let prefix: String = self.0.iter().take(4).map(|b| format!("{b:02x}")).collect();
    write!(f, "EncryptedPhone({prefix}…)")
  }
}

/// Deterministic, reversible phone number encryption.
pub trait PhoneCodec: Send + Sync {
  fn encrypt(&self, phone: &str) -> Result<EncryptedPhone>;

  fn decrypt(&self, phone: &EncryptedPhone) -> Result<String>;
}
