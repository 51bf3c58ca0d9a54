//! Core types and trait definitions for the Courtbot notification engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends, feed adapters and the job runner all depend on it; it
//! depends on nothing proprietary.

pub mod audit;
pub mod clock;
pub mod codec;
pub mod error;
pub mod gateway;
pub mod hearing;
pub mod matching;
pub mod messages;
pub mod request;
pub mod store;

pub use error::{Error, Result};
