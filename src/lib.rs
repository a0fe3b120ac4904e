//! Host-side driver and simulator for the LINE single-wire serial bus.

pub mod codec;
pub mod constants;
pub mod error;
pub mod master;
pub mod network;
pub mod schedule;
pub mod simulation;
pub mod transport;
pub mod vbus;

pub use error::{Error, Result};
