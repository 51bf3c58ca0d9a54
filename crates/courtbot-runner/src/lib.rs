//! Job runner for Courtbot.
//!
//! Wires a [`CourtStore`](courtbot_core::store::CourtStore), a
//! [`Gateway`](courtbot_core::gateway::Gateway) and the feed adapters into the
//! `load`, `send-reminders` and `send-unmatched` passes driven by the
//! `courtbot` binary.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod settle;
pub mod twilio;

pub use error::{DispatchError, Error, Result};
pub use jobs::{IngestResult, Job, JobSummary, Runner, load};

use std::path::PathBuf;

use chrono::TimeDelta;
use courtbot_core::messages::MessageContext;
use serde::Deserialize;
use twilio::TwilioConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_queue_ttl_days() -> i64 { 10 }
fn default_max_concurrency() -> usize { 8 }
fn default_http_timeout_secs() -> u64 { 30 }

/// Runtime configuration, deserialised from `courtbot.toml` and `COURTBOT_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
  pub database_path:        PathBuf,
  pub phone_encryption_key: String,
  #[serde(default)]
  pub data_urls:            Option<String>,
  #[serde(default = "default_queue_ttl_days")]
  pub queue_ttl_days:       i64,
  #[serde(default)]
  pub court_name:           Option<String>,
  #[serde(default)]
  pub court_public_url:     Option<String>,
  #[serde(default)]
  pub sender_number:        Option<String>,
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency:      usize,
  #[serde(default = "default_http_timeout_secs")]
  pub http_timeout_secs:    u64,
  #[serde(default)]
  pub dry_run:              bool,
  #[serde(default)]
  pub twilio:               Option<TwilioConfig>,
}

impl RunnerConfig {
  pub fn queue_ttl(&self) -> TimeDelta { TimeDelta::days(self.queue_ttl_days) }

  pub fn http_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.http_timeout_secs)
  }

  /// Court strings for message bodies. Required by the dispatch jobs only.
  pub fn message_context(&self) -> Result<MessageContext> {
    Ok(MessageContext {
      court_name: required(&self.court_name, "court_name")?,
      public_url: required(&self.court_public_url, "court_public_url")?,
    })
  }

  pub fn sender(&self) -> Result<String> { required(&self.sender_number, "sender_number") }
}

fn required(value: &Option<String>, key: &str) -> Result<String> {
  match value.as_deref().map(str::trim) {
    Some(v) if !v.is_empty() => Ok(v.to_owned()),
    _ => Err(Error::Config(format!("{key} is not set"))),
  }
}

#[cfg(test)]
mod tests;
