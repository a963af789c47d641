//! Client and poller for the MicroBT Whatsminer management API.
//!
//! The layers, bottom up: [`transport`] moves one request and reply over TCP,
//! [`codec`] handles the JSON and encryption, [`machine`] owns the session
//! token for one device, [`api`] offers typed operations in either dialect,
//! [`detect`] picks the dialect, and [`coordinator`] polls on an interval.

pub mod api;
pub mod codec;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod machine;
pub mod setup;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod testing;
