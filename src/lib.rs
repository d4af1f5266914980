#![deny(missing_docs)]

//! This crate lets many network clients share one serial-attached device.
//!
//! Lines the device produces are broadcast to every connected client.
//! Lines a client sends are forwarded to the device.
//!
//! Clients connect over TCP and speak newline-delimited text.
//! Each client has a bounded outbox. If a client cannot keep up,
//! lines are dropped for that client and it is disconnected,
//! so one stalled client never holds up the others.

/// Code relating to setting up the server which accepts connections and spawns sessions for clients.
pub mod server;

/// The set of currently connected clients.
pub mod registry;

/// The per-connection pump between a client socket and the device.
pub mod session;

/// Reads lines from the device and fans them out to clients.
pub mod pump;

/// The shared device: a line reader plus a serialized line writer.
pub mod device;

/// An in-memory device, useful when no serial port is available.
pub mod mock;

/// Serial port driver and line codecs.
pub mod serial;

/// A small line client for talking to a running hub.
pub mod client;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
