//! Plumbing shared by the sender, the sync engine and the command line tools.
pub mod alles_time;
pub mod box_error;
pub mod config;
pub mod milli_timer;
pub mod multicast_sock;
