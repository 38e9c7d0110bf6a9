//! # tagwatch-server
//!
//! HTTP server library for the tagwatch Bluetooth tracker monitor.
//!
//! This library provides the API handlers, state wiring, logging setup, and
//! the radio watchdog used by the `tagwatch-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
pub mod watchdog;
