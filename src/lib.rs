//! Anchor Relayer - anchors document roots on an Ethereum ledger
//!
//! Submits anchor pre-commits and commits, identity creations and key
//! registrations, and reports each write once the ledger event confirming it
//! has been observed.

pub mod anchors;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod queue;
pub mod tx;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AnchorError, AnchorResult};
