use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::completion::{PendingCallback, SendResult};

/// The smallest message that could ever be written.
pub(crate) const SMALLEST_VALID_PAYLOAD: &[u8] = b"a:0|c";

/// A flushed batch: one payload and the callbacks of every message coalesced into it.
pub(crate) struct Batch {
    payload: Bytes,
    callbacks: Vec<PendingCallback>,
}

impl Batch {
    /// Creates a batch holding a single message.
    pub fn single(message: &str, callback: PendingCallback) -> Self {
        Self { payload: Bytes::copy_from_slice(message.as_bytes()), callbacks: vec![callback] }
    }

    /// Returns the payload to write.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the number of messages in the batch.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Completes every message in the batch with the outcome of the batch's write, in the order they were added.
    pub fn complete(self, result: &SendResult) {
        for callback in self.callbacks {
            callback.complete(result.clone());
        }
    }
}

/// Coalesces messages into newline-delimited payloads for more efficient network I/O.
///
/// StatsD lines are newline delimited, which means that multiple metrics can be sent in a single datagram and then
/// trivially split apart by the remote server. This saves on the number of system calls and packets required to send
/// the metrics.
///
/// A batch is bounded by a maximum length and a maximum delay. Adding a message that would push the batch past the
/// maximum length first takes the current batch, so that it can be flushed, before starting a new batch with the
/// message. The first message added after a flush arms the deadline for the batch; adding more messages does not
/// push the deadline back.
///
/// A batch that has reached the maximum length cannot take any more messages, and is ready to be taken with
/// [`take_full`][BatchWriter::take_full]. This includes a message that is longer than the maximum length on its own:
/// it is still queued, alone, and it is up to the transport to accept or reject it.
pub(crate) struct BatchWriter {
    max_batch_len: usize,
    max_batch_delay: Duration,
    buf: BytesMut,
    callbacks: Vec<PendingCallback>,
    deadline: Option<Instant>,
}

impl BatchWriter {
    /// Creates a new `BatchWriter` with the given maximum batch length and delay.
    pub fn new(max_batch_len: usize, max_batch_delay: Duration) -> Self {
        // NOTE: This should also be handled in the builder, but we want to just double check here that we're getting a
        // properly sanitized value.
        assert!(
            max_batch_len >= SMALLEST_VALID_PAYLOAD.len(),
            "maximum batch length is too small to allow any metrics to be written (must be {} or greater)",
            SMALLEST_VALID_PAYLOAD.len()
        );

        Self {
            max_batch_len,
            max_batch_delay,
            buf: BytesMut::with_capacity(max_batch_len),
            callbacks: Vec::new(),
            deadline: None,
        }
    }

    /// Returns the deadline by which the current batch must be flushed, if a batch is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if no messages are pending.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Adds a message to the current batch.
    ///
    /// If the message does not fit in the current batch, the current batch is returned so that it can be flushed, and
    /// the message becomes the first message of the next batch.
    pub fn push(&mut self, message: &str, callback: PendingCallback, now: Instant) -> Option<Batch> {
        let separator_len = usize::from(!self.is_empty());
        let flushed = if self.buf.len() + separator_len + message.len() > self.max_batch_len {
            self.take()
        } else {
            None
        };

        if self.is_empty() {
            self.deadline = Some(now + self.max_batch_delay);
        } else {
            self.buf.extend_from_slice(b"\n");
        }

        self.buf.extend_from_slice(message.as_bytes());
        self.callbacks.push(callback);

        flushed
    }

    /// Takes the current batch if it has reached the maximum length.
    pub fn take_full(&mut self) -> Option<Batch> {
        if self.buf.len() >= self.max_batch_len {
            self.take()
        } else {
            None
        }
    }

    /// Takes the current batch, leaving the writer empty and disarming the deadline.
    ///
    /// Returns `None` if no messages are pending.
    pub fn take(&mut self) -> Option<Batch> {
        self.deadline = None;
        if self.is_empty() {
            return None;
        }

        let payload = self.buf.split().freeze();
        let callbacks = std::mem::take(&mut self.callbacks);
        Some(Batch { payload, callbacks })
    }
}
