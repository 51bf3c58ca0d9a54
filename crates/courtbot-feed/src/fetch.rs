//! Downloading feed payloads.

use std::{future::Future, time::Duration};

use reqwest::Client;
use tracing::debug;

use crate::FetchError;

/// User agent sent with every feed request.
pub const USER_AGENT: &str = concat!("courtbot/", env!("CARGO_PKG_VERSION"));

/// Something that can turn a source URL into its payload text.
pub trait Fetch: Send + Sync {
  fn fetch<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<String, FetchError>> + Send + 'a;
}

/// [`Fetch`] over HTTP(S).
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> reqwest::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .user_agent(USER_AGENT)
      .build()?;
    Ok(Self { client })
  }
}

impl Fetch for HttpFetcher {
  async fn fetch<'a>(&'a self, url: &'a str) -> Result<String, FetchError> {
    let transport = |source| FetchError::Transport { url: url.to_owned(), source };

    let resp = self.client.get(url).send().await.map_err(transport)?;
    let status = resp.status();
    if !status.is_success() {
      return Err(FetchError::Status { url: url.to_owned(), status: status.as_u16() });
    }

    let body = resp.text().await.map_err(transport)?;
    debug!(url, bytes = body.len(), "fetched feed source");
    Ok(body)
  }
}
