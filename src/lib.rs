//! alles_rust - controller for a swarm of alles synths
//!
//! provides the wire protocol (text commands and sync replies), the multicast
//! session every synth listens on, and the sync engine that measures round trip
//! time, reliability and battery state for each synth on the network.
#[macro_use]
extern crate num_derive;

pub mod common;
pub mod controller;
pub mod message;
pub mod utils;
