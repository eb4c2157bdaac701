//! Read-only access to the local message archive (`chat.db`).
//!
//! Wraps [`tokio_rusqlite`] so every query runs on a dedicated thread without
//! blocking the async runtime. The archive is opened read-only and never
//! written.

mod epoch;
mod query;
mod reader;

pub mod error;

pub use epoch::{APPLE_EPOCH_OFFSET, apple_time_to_utc, convert_apple_time};
pub use error::{Error, Result};
pub use reader::ChatDb;
