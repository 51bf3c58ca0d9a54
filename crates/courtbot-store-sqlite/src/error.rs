//! Error type for `courtbot-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("stored phone is not valid hex: {0}")]
  Phone(#[from] hex::FromHexError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("invalid run id: {0}")]
  RunId(#[from] uuid::Error),

  #[error("unknown {kind} name in audit log: {name:?}")]
  UnknownName { kind: &'static str, name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
