//! cumulus-core — wire format, protocol constants, and configuration.
//! All other Cumulus crates depend on this one.

pub mod config;
pub mod wire;

pub use wire::{Chunk, Command, DecodeError, Message, Verb, WireError};
