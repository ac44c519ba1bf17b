//! Store of the aircraft currently being tracked.
//!
//! The upstream feed refreshes aircraft state (position, velocity, heading)
//! every few seconds; readers want "everything currently flying for
//! manufacturer X". This crate keeps only the most recent state per aircraft
//! in a SQLite table and forgets aircraft that stop reporting.
//!
//! The database is an ephemeral cache, not a system of record. If it is
//! deleted it refills from the next feed refreshes.
//!
//! # Architecture
//! - [`Database`]: the SQLite pool, schema migrations and exclusive write
//!   transactions.
//! - [`staleness`]: the single rule deciding when an aircraft stops being
//!   live. Applied when reading and when sweeping.
//! - [`TrackingStore`]: batched upserts, per-manufacturer queries, clearing,
//!   and ownership of the background sweeper that deletes stale rows.
//! - [`Clock`]: where "now" comes from.

mod clock;
mod db;
pub mod error;
mod models;
mod repo;
pub mod staleness;
mod store;
mod sweeper;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::db::{Database, PoolSettings};
pub use crate::models::{GroupSummary, PositionUpdate, StaticAttributes, TrackedEntity};
pub use crate::staleness::StalenessPolicy;
pub use crate::store::{StoreOptions, TrackingStore};
