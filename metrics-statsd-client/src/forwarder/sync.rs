use std::{sync::Arc, time::Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, trace};

use crate::{
    completion::PendingCallback,
    telemetry::Telemetry,
    transport::Transport,
    writer::{Batch, BatchWriter},
};

use super::{Command, ForwarderConfiguration};

/// Synchronous forwarder.
///
/// Runs on a dedicated background thread, owning the pending batch and the transport. Client handles submit encoded
/// messages over a channel, so they never wait on network I/O themselves. Messages are written in the order they were
/// submitted.
pub struct Forwarder {
    rx: Receiver<Command>,
    writer: Option<BatchWriter>,
    transport: Transport,
}

impl Forwarder {
    /// Create a new synchronous `Forwarder`.
    pub fn new(config: ForwarderConfiguration, rx: Receiver<Command>, telemetry: Arc<Telemetry>) -> Self {
        let writer = config
            .batching
            .map(|batching| BatchWriter::new(batching.max_batch_len, batching.max_batch_delay));
        let transport = Transport::new(
            config.remote_addr,
            config.shared_socket,
            config.idle_timeout,
            config.write_timeout,
            telemetry,
        );

        Forwarder { rx, writer, transport }
    }

    /// Returns the earliest of the batch deadline and the idle socket deadline, if any.
    fn next_deadline(&self) -> Option<Instant> {
        let batch_deadline = self.writer.as_ref().and_then(BatchWriter::deadline);
        match (batch_deadline, self.transport.idle_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run the forwarder until it is closed or every client handle has been dropped.
    pub fn run(mut self) {
        debug!("Forwarder started.");

        loop {
            // Deadlines are checked on every iteration so that a steady stream of commands cannot starve them.
            let now = Instant::now();
            if self.next_deadline().is_some_and(|deadline| deadline <= now) {
                self.handle_deadlines(now);
            }

            let next = match self.next_deadline() {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok(Command::Write { message, callback }) => self.write(&message, callback),
                Ok(Command::Flush) => self.flush(),
                Ok(Command::Close { ack }) => {
                    self.shutdown();
                    let _ = ack.send(());
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.shutdown();
                    break;
                }
            }
        }

        debug!("Forwarder stopped.");
    }

    fn write(&mut self, message: &str, callback: PendingCallback) {
        let Some(writer) = self.writer.as_mut() else {
            return self.send_batch(Batch::single(message, callback));
        };

        let overflowed = writer.push(message, callback, Instant::now());
        let full = writer.take_full();
        for batch in overflowed.into_iter().chain(full) {
            self.send_batch(batch);
        }
    }

    fn handle_deadlines(&mut self, now: Instant) {
        let batch_due = self
            .writer
            .as_ref()
            .and_then(BatchWriter::deadline)
            .is_some_and(|deadline| deadline <= now);
        if batch_due {
            trace!("Batch deadline reached.");
            self.flush();
        }

        self.transport.expire_idle(now);
    }

    fn flush(&mut self) {
        if let Some(batch) = self.writer.as_mut().and_then(BatchWriter::take) {
            self.send_batch(batch);
        }
    }

    fn send_batch(&mut self, batch: Batch) {
        trace!(messages = batch.len(), payload_len = batch.payload().len(), "Sending payload.");

        let result = self.transport.send(batch.payload());
        batch.complete(&result);
    }

    fn shutdown(&mut self) {
        self.flush();
        self.transport.close();
    }
}
