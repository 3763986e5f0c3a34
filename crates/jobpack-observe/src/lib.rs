//! Logging setup for the jobpack daemon and client.

mod logger;
pub use logger::*;
