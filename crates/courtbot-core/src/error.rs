//! Error types for `courtbot-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid case identifier: {0:?}")]
  InvalidCaseId(String),

  #[error("phone codec failure: {0}")]
  Codec(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
