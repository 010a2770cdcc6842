//! Fork-backed contract testing harness for yield vault / strategy pairs.
//!
//! A [`session::Session`] owns one ledger adapter, the identity registry and the reserve
//! book. Each scenario gets a freshly built fixture (vault + strategy + want) inside a
//! snapshot, runs its steps in order, and reports an [`report::Outcome`].

pub mod adapter;
pub mod asset;
pub mod checker;
pub mod contracts;
pub mod error;
pub mod fixture;
pub mod fork_db;
pub mod funding;
pub mod identity;
pub mod report;
pub mod scenario;
pub mod session;
pub mod utils;

pub mod config {
    pub mod chains;
}
