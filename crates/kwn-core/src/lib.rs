//! Core domain + policy for the Kwork project notifier.
//!
//! This crate is intentionally framework-agnostic. The Kwork API, Redis and
//! Telegram live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod pacing;
pub mod poller;
pub mod ports;
pub mod scheduler;
pub mod security;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
