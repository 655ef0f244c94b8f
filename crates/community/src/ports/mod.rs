//! Port traits implemented by infrastructure crates.

pub mod chat;
pub mod events;
pub mod source_host;
pub mod store;
