use std::{sync::Arc, time::Duration};

use crate::{
    completion::PendingCallback,
    transport::{DatagramSocket, RemoteAddr},
};

pub mod sync;

/// Forwarder configuration.
#[derive(Clone)]
pub struct ForwarderConfiguration {
    pub remote_addr: RemoteAddr,
    pub shared_socket: Option<Arc<dyn DatagramSocket>>,
    pub batching: Option<BatchConfiguration>,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
}

/// Batching configuration.
#[derive(Clone, Copy, Debug)]
pub struct BatchConfiguration {
    pub max_batch_len: usize,
    pub max_batch_delay: Duration,
}

/// Commands sent from client handles to the forwarder.
pub enum Command {
    /// Write an encoded message, completing the callback once the write has happened.
    ///
    /// A write still queued when the forwarder stops is dropped with the channel, which completes its callback with
    /// `SendError::Closed`.
    Write { message: String, callback: PendingCallback },

    /// Flush any pending batch immediately.
    Flush,

    /// Flush any pending batch, release the socket, and stop the forwarder.
    ///
    /// The acknowledgement is sent once the final flush has been attempted.
    Close { ack: crossbeam_channel::Sender<()> },
}
