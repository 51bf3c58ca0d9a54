//! Per-item dispatch: persist the intended state change, then send.
//!
//! Each operation handles exactly one candidate and reports a [`Delivery`] or
//! a [`DispatchError`]; it never fails the batch it belongs to. The phone is
//! decrypted before anything is written so a codec failure leaves no trace.

use std::sync::Arc;

use courtbot_core::{
  clock::Clock,
  codec::PhoneCodec,
  gateway::{Gateway, Receipt},
  matching::{ExpiredGroup, Match},
  messages::{self, MessageContext},
  store::{CourtStore, MatchUpdate},
};
use tracing::{debug, warn};

use crate::error::DispatchError;

/// What happened to an item that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
  Sent(Receipt),
  Skipped(Skip),
}

/// Why nothing was sent for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
  /// The request disappeared between query and dispatch (opt-out).
  Withdrawn,
  /// Another pass already announced this match.
  AlreadyMatched,
  /// Another pass already deleted these expired requests.
  AlreadyExpired,
  /// The ledger already holds this hearing occurrence.
  AlreadyNotified,
}

/// Everything a dispatch needs, shared by all items of a pass.
pub struct Dispatcher<S, G> {
  pub(crate) store:    Arc<S>,
  pub(crate) gateway:  Arc<G>,
  pub(crate) codec:    Arc<dyn PhoneCodec>,
  pub(crate) clock:    Arc<dyn Clock>,
  pub(crate) messages: Arc<MessageContext>,
  pub(crate) sender:   Arc<str>,
}

impl<S, G> Clone for Dispatcher<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      gateway:  Arc::clone(&self.gateway),
      codec:    Arc::clone(&self.codec),
      clock:    Arc::clone(&self.clock),
      messages: Arc::clone(&self.messages),
      sender:   Arc::clone(&self.sender),
    }
  }
}

impl<S, G> Dispatcher<S, G>
where
  S: CourtStore + 'static,
  G: Gateway + 'static,
{
  pub fn new(
    store: Arc<S>,
    gateway: Arc<G>,
    codec: Arc<dyn PhoneCodec>,
    clock: Arc<dyn Clock>,
    messages: MessageContext,
    sender: impl Into<Arc<str>>,
  ) -> Self {
    Self { store, gateway, codec, clock, messages: Arc::new(messages), sender: sender.into() }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn clock(&self) -> &dyn Clock { &*self.clock }

  /// First match for a request: flag it known, then announce the hearing.
  ///
  /// A gateway failure leaves the flag set; the citizen still gets the
  /// reminder the day before.
  pub async fn dispatch_match(&self, m: Match) -> Result<Delivery, DispatchError> {
    let to = self.codec.decrypt(&m.request.phone).map_err(DispatchError::Codec)?;

    let update = self
      .store
      .apply_match(m.request.case_id.clone(), m.request.phone.clone(), self.clock.now())
      .await
      .map_err(DispatchError::persistence)?;
    match update {
      MatchUpdate::Applied => {}
      MatchUpdate::AlreadyMatched => return Ok(Delivery::Skipped(Skip::AlreadyMatched)),
      MatchUpdate::Missing => return Ok(Delivery::Skipped(Skip::Withdrawn)),
    }

    let body = messages::found_it_will_remind(&self.messages, &m.hearing, &*self.clock);
    let receipt = self.gateway.send(&to, &self.sender, &body).await?;
    debug!(case_id = %m.request.case_id, receipt = %receipt.id, "match notice sent");
    Ok(Delivery::Sent(receipt))
  }

  /// Expired requests for one phone: delete whatever is still unmatched and
  /// tell the citizen which cases were dropped, in one message.
  pub async fn dispatch_expiry(&self, group: ExpiredGroup) -> Result<Delivery, DispatchError> {
    let to = self.codec.decrypt(&group.phone).map_err(DispatchError::Codec)?;

    let deleted = self
      .store
      .apply_expiry(group.phone.clone(), group.case_ids.clone())
      .await
      .map_err(DispatchError::persistence)?;
    if deleted.is_empty() {
      return Ok(Delivery::Skipped(Skip::AlreadyExpired));
    }

    let body = messages::unable_to_find(&self.messages, &deleted);
    let receipt = self.gateway.send(&to, &self.sender, &body).await?;
    debug!(case_ids = %deleted.join(","), receipt = %receipt.id, "expiry notice sent");
    Ok(Delivery::Sent(receipt))
  }

  /// Day-before reminder, guarded by the notification ledger.
  ///
  /// The ledger row is written first. If the gateway then refuses the
  /// message the row is released again so the next pass retries.
  pub async fn dispatch_reminder(&self, m: Match) -> Result<Delivery, DispatchError> {
    let to = self.codec.decrypt(&m.request.phone).map_err(DispatchError::Codec)?;
    let case_id = &m.request.case_id;

    let fresh = self
      .store
      .record_reminder(case_id.clone(), m.request.phone.clone(), m.hearing.date, self.clock.now())
      .await
      .map_err(DispatchError::persistence)?;
    if !fresh {
      return Ok(Delivery::Skipped(Skip::AlreadyNotified));
    }

    let body = messages::reminder(&self.messages, &m.hearing, &*self.clock);
    match self.gateway.send(&to, &self.sender, &body).await {
      Ok(receipt) => {
        debug!(%case_id, receipt = %receipt.id, "reminder sent");
        Ok(Delivery::Sent(receipt))
      }
      Err(e) => {
        let released = self
          .store
          .release_reminder(case_id.clone(), m.request.phone.clone(), m.hearing.date)
          .await;
        if let Err(release_err) = released {
          warn!(%case_id, error = %release_err, "reminder ledger row could not be released");
        }
        Err(e.into())
      }
    }
  }
}
