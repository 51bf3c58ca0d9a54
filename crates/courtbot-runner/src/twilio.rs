//! Gateway implementations: the Twilio REST API and a logging dry run.

use std::time::Duration;

use courtbot_core::gateway::{Gateway, GatewayError, Receipt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

fn default_base_url() -> String { "https://api.twilio.com".to_owned() }

/// Twilio account credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
  pub account_sid: String,
  pub auth_token:  String,
  #[serde(default = "default_base_url")]
  pub base_url:    String,
}

/// Sends SMS through Twilio's `Messages` resource.
#[derive(Clone)]
pub struct TwilioGateway {
  client: Client,
  config: TwilioConfig,
}

#[derive(Deserialize)]
struct MessageResource {
  sid: String,
}

#[derive(Deserialize)]
struct ApiError {
  code:    Option<i64>,
  message: String,
}

impl TwilioGateway {
  pub fn new(config: TwilioConfig, timeout: Duration) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, config })
  }

  fn messages_url(&self) -> String {
    format!(
      "{}/2010-04-01/Accounts/{}/Messages.json",
      self.config.base_url.trim_end_matches('/'),
      self.config.account_sid
    )
  }
}

impl Gateway for TwilioGateway {
  async fn send<'a>(
    &'a self,
    to: &'a str,
    from: &'a str,
    body: &'a str,
  ) -> Result<Receipt, GatewayError> {
    let resp = self
      .client
      .post(self.messages_url())
      .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
      .form(&[("To", to), ("From", from), ("Body", body)])
      .send()
      .await
      .map_err(|e| GatewayError::Transient(e.to_string()))?;

    let status = resp.status();
    if status.is_success() {
      let msg: MessageResource = resp
        .json()
        .await
        .map_err(|e| GatewayError::Transient(format!("unreadable response: {e}")))?;
      return Ok(Receipt { id: msg.sid });
    }

    let detail = match resp.json::<ApiError>().await {
      Ok(ApiError { code: Some(code), message }) => format!("{status}: {message} (code {code})"),
      Ok(ApiError { code: None, message }) => format!("{status}: {message}"),
      Err(_) => status.to_string(),
    };
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
      Err(GatewayError::Transient(detail))
    } else {
      Err(GatewayError::Permanent(detail))
    }
  }
}

/// Logs instead of sending. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

impl Gateway for LogGateway {
  async fn send<'a>(
    &'a self,
    _to: &'a str,
    _from: &'a str,
    body: &'a str,
  ) -> Result<Receipt, GatewayError> {
    let id = format!("dry-run-{}", Uuid::new_v4());
    info!(receipt = %id, chars = body.chars().count(), body, "dry run: message not sent");
    Ok(Receipt { id })
  }
}
