//! The controller side: sending commands to the synths and measuring them.
//!
//! [`alles::Alles`] ties a transport and a clock together and is what
//! scripts call.  [`sender::CommandSender`] and [`sync_engine::SyncEngine`]
//! do the actual work and can be driven directly against any [`Transport`].
//!
//! [`Transport`]: crate::common::multicast_sock::Transport
pub mod alles;
pub mod client_record;
pub mod sender;
pub mod sync_engine;
