#![deny(clippy::all)]

//! A generic time-aware fetch-through cache.
//!
//! [`Cache`] sits between feature code and a slow or expensive origin. On
//! `get`, a value is either retrieved from the injected [`Storage`] (when
//! present and fresh) or obtained through the injected [`Fetcher`] and
//! stored. Freshness is decided from two per-key timestamps kept in an
//! [`AccessLedger`]: the time the entry was last (re)created and the time it
//! was last touched. Because the ledger is durable, expiration decisions
//! survive process restarts.
//!
//! [`Storage`]: ports::Storage
//! [`Fetcher`]: ports::Fetcher
//! [`AccessLedger`]: ports::AccessLedger

pub mod cache;
pub mod clock;
pub mod domain;
pub mod memory;
pub mod ports;

pub use cache::{Cache, CacheBuilder};
pub use domain::{Access, AccessKind, CacheConfig, Expiration};
pub use shared::{BoxError, Error, Result};
