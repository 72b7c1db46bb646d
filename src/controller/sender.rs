//! Fire and forget command sending.
//!
//! UDP multicast gives no delivery guarantee and the synths don't ack, so
//! the only loss mitigation is sending the same packet more than once.
use log::{trace, warn};

use crate::{
    common::{alles_time::Clock, multicast_sock::Transport},
    message::command_message::Command,
};

pub struct CommandSender<'a, T: Transport, C: Clock> {
    transport: &'a mut T,
    clock: &'a C,
}

impl<'a, T: Transport, C: Clock> CommandSender<'a, T, C> {
    pub fn new(transport: &'a mut T, clock: &'a C) -> Self {
        CommandSender { transport, clock }
    }

    /// send a command once
    pub fn send(&mut self, cmd: &Command) {
        self.send_with_retries(cmd, 1);
    }

    /// Send the same encoded packet `retries` times back to back.  A count
    /// of 0 still sends once.  Send errors are logged and otherwise ignored.
    pub fn send_with_retries(&mut self, cmd: &Command, retries: u32) {
        let msg = cmd.encode(self.clock.now_millis());
        trace!("send {} x{}", msg, retries.max(1));
        for _ in 0..retries.max(1) {
            if let Err(e) = self.transport.send(msg.as_bytes()) {
                warn!("command {} not sent: {}", msg, e);
            }
        }
    }
}
