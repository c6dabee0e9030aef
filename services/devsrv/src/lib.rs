//! Device gateway
//!
//! Heater/dosage control units hold a persistent TCP connection to this
//! service. Each connection becomes a [`session::Session`] that forwards
//! queued commands to the device, decodes its unsolicited reports and keeps
//! the device record current.
//!
//! ## Layout
//!
//! - `protocol`: frame codec, request table, response and report decoding
//! - `link`: framed socket I/O with the retrying exchange
//! - `report` / `dispatcher`: report handling and the command table
//! - `session` / `registry` / `listener`: connection lifecycle
//! - `store` / `queue`: device records and command queues
//! - `monitor`: periodic status polling

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod listener;
pub mod monitor;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod report;
pub mod session;
pub mod store;

pub use error::{DevSrvError, Result};
