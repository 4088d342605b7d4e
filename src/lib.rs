//! Persistence core of an Algorand-style ledger indexer.
//!
//! Projects each block (header, state delta, expanded transaction list)
//! into a relational store within a single serializable transaction.

pub mod config;
pub mod core;
pub mod error;
pub mod store;
pub mod writer;
