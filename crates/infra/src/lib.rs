//! Infrastructure layer: DB, Redis, config, external services.

pub mod ai;
pub mod auth_service;
pub mod event_bus;
pub mod event_store;
pub mod command_dispatcher;
pub mod jobs;
pub mod query;
pub mod read_model;
pub mod projections;
pub mod cache;
pub mod saga;
pub mod sequencer;
pub mod workers;
pub mod db;

#[cfg(test)]
mod integration_tests;

pub use cache::{Cache, CacheError, DistributedLock, RateLimitDecision, RateLimiter};
pub use sequencer::{Sequencer, SequencerError};

/// Configuration loading and representation.
pub mod config {}

/// External service clients/adapters.
pub mod external {}
