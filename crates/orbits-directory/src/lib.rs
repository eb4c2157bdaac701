//! Read-only access to the local contact directory.
//!
//! The directory is a root folder holding one address-book database per
//! container: the local container at the root and one per synced account
//! under `Sources/<id>/`. Each database is opened read-only through
//! [`tokio_rusqlite`], so enumeration never blocks the async runtime.

mod reader;
mod schema;

pub mod error;

pub use error::{Error, Result};
pub use orbits_core::contact::build_handle_index;
pub use reader::AddressBook;
