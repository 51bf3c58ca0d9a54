//! Error types for `courtbot-runner`.

use courtbot_core::gateway::GatewayError;
use courtbot_feed::{FetchError, ParseError, SourceError};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A run-level failure: the job could not complete its pass.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error(transparent)]
  Core(#[from] courtbot_core::Error),

  #[error("configuration: {0}")]
  Config(String),
}

impl Error {
  pub(crate) fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

/// Why a single candidate item was not delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
  #[error(transparent)]
  Gateway(#[from] GatewayError),

  #[error("persistence failed: {0}")]
  Persistence(#[source] BoxError),

  #[error("phone could not be decrypted: {0}")]
  Codec(#[source] courtbot_core::Error),
}

impl DispatchError {
  pub(crate) fn persistence<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Persistence(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
