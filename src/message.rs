//! The text messages that go over the wire to and from the synths.
//!
//! Commands are one ascii line of `<tag><value>` pairs.  Sync replies are
//! lines starting with `_` carrying the client's time, the beacon index it
//! is answering, its id, its address and its battery state.
pub mod battery;
pub mod command_message;
pub mod sync_message;
