//! Enrichment, reconciliation and synchronisation of local contact data into
//! a person store.
//!
//! [`SyncEngine`] drives one run end to end: it checks the session and the
//! OS capabilities, reads the contact directory and message archive, joins
//! them into candidate rows ([`enrich`]), diffs those against the stored
//! rows ([`reconcile`]), and writes the result in batches ([`persist`]).

pub mod engine;
pub mod enrich;
pub mod error;
pub mod persist;
pub mod reconcile;

pub use engine::{InsertMode, SyncEngine, SyncOptions, SyncPhase, SyncReport};
pub use persist::InsertFailure;
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
