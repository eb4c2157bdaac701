//! Core types and trait definitions for the Orbits sync engine.
//!
//! This crate is deliberately free of database, HTTP, and OS dependencies.
//! The directory, archive, and store crates implement the traits defined
//! here; `orbits-sync` drives them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod contact;
pub mod message;
pub mod normalize;
pub mod person;
pub mod source;
pub mod store;
