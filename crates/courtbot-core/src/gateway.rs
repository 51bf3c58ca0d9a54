//! The outbound messaging gateway boundary.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
  /// Provider-assigned message identifier.
  pub id: String,
}

/// Why the gateway did not accept a message.
///
/// The dispatcher records both kinds and moves on; the distinction exists for
/// whoever reads the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
  /// Network failure, timeout, throttling or a provider-side 5xx.
  #[error("transient gateway failure: {0}")]
  Transient(String),

  /// The provider refused this message (invalid or opted-out number, …).
  #[error("gateway rejected message: {0}")]
  Permanent(String),
}

impl GatewayError {
  pub fn is_transient(&self) -> bool { matches!(self, Self::Transient(_)) }
}

/// Something that can deliver a text message.
pub trait Gateway: Send + Sync {
  fn send<'a>(
    &'a self,
    to: &'a str,
    from: &'a str,
    body: &'a str,
  ) -> impl Future<Output = Result<Receipt, GatewayError>> + Send + 'a;
}
