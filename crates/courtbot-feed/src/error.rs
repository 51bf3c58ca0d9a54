//! Error types for the feed crate.

use thiserror::Error;

use crate::SourceKind;

/// A source list entry that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
  #[error("no feed sources configured")]
  Empty,

  #[error("unknown source kind {kind:?} for {url}")]
  UnknownKind { url: String, kind: String },
}

/// A source could not be downloaded.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request to {url} failed: {source}")]
  Transport {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{url} answered HTTP {status}")]
  Status { url: String, status: u16 },
}

/// A downloaded payload yielded nothing usable.
#[derive(Debug, Error)]
pub enum ParseError {
  #[error("{kind} payload contained no valid records ({skipped} rows skipped)")]
  NoRecords { kind: SourceKind, skipped: usize },

  #[error("{kind} payload is unreadable: {reason}")]
  Malformed { kind: SourceKind, reason: String },
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;
