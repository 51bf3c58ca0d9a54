//! Run a batch of independent items concurrently and keep every outcome.
//!
//! [`settle_all`] never short-circuits: each item ends up in the returned
//! [`Manifest`] exactly once, as a success, an error, or a panic.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

/// Why an item did not produce a value.
#[derive(Debug)]
pub enum Failure<E> {
  Error(E),
  /// The item's task panicked or was cancelled.
  Panicked(String),
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Error(e) => e.fmt(f),
      Self::Panicked(msg) => write!(f, "task failed: {msg}"),
    }
  }
}

/// One item and what became of it.
#[derive(Debug)]
pub struct Settled<T, R, E> {
  pub item:    T,
  pub outcome: Result<R, Failure<E>>,
}

/// Every item of a batch with its outcome, in input order.
#[derive(Debug)]
pub struct Manifest<T, R, E> {
  pub entries: Vec<Settled<T, R, E>>,
}

impl<T, R, E> Manifest<T, R, E> {
  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn successes(&self) -> impl Iterator<Item = (&T, &R)> {
    self
      .entries
      .iter()
      .filter_map(|s| s.outcome.as_ref().ok().map(|r| (&s.item, r)))
  }

  pub fn failures(&self) -> impl Iterator<Item = (&T, &Failure<E>)> {
    self
      .entries
      .iter()
      .filter_map(|s| s.outcome.as_ref().err().map(|e| (&s.item, e)))
  }
}

/// Run `task` over every item with at most `limit` in flight at once.
pub async fn settle_all<T, R, E, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Manifest<T, R, E>
where
  T: Clone,
  R: Send + 'static,
  E: Send + 'static,
  F: Fn(T) -> Fut,
  Fut: Future<Output = Result<R, E>> + Send + 'static,
{
  let permits = Arc::new(Semaphore::new(limit.max(1)));
  let mut set = JoinSet::new();
  let mut index_of = HashMap::with_capacity(items.len());

  for (idx, item) in items.iter().cloned().enumerate() {
    let permits = Arc::clone(&permits);
    let fut = task(item);
    let handle = set.spawn(async move {
      let _permit = permits.acquire_owned().await;
      fut.await
    });
    index_of.insert(handle.id(), idx);
  }

  let mut slots: Vec<Option<Result<R, Failure<E>>>> = items.iter().map(|_| None).collect();
  while let Some(joined) = set.join_next_with_id().await {
    let (id, outcome) = match joined {
      Ok((id, result)) => (id, result.map_err(Failure::Error)),
      Err(e) => (e.id(), Err(Failure::Panicked(e.to_string()))),
    };
    if let Some(&idx) = index_of.get(&id) {
      slots[idx] = Some(outcome);
    }
  }

  let entries = items
    .into_iter()
    .zip(slots)
    .map(|(item, slot)| Settled {
      item,
      outcome: slot.unwrap_or_else(|| Err(Failure::Panicked("task never reported".into()))),
    })
    .collect();
  Manifest { entries }
}
