//! Core domain + application logic for the news feed bot.
//!
//! This crate is framework-agnostic. Telegram, HTTP feed retrieval and SQLite
//! live behind ports (traits) implemented in adapter crates.

pub mod cache;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod poller;
pub mod ports;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{DispatchError, Error, FetchError, Result, StorageError};
