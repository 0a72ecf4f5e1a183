use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{
            AtomicUsize,
            Ordering::{AcqRel, Acquire},
        },
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::error;

/// Errors that could occur while sending a metric.
///
/// Sends are best-effort: errors are only ever reported through the completion of the call that caused them, and are
/// never retried. All payloads coalesced into a single batch share the outcome of that batch's write, which is why
/// this type is cheaply cloneable.
#[derive(Clone, Debug, Error)]
pub enum SendError {
    /// Writing the payload to the socket failed.
    #[error("failed to write payload: {0}")]
    Io(Arc<io::Error>),

    /// Resolving the remote host failed.
    #[error("failed to resolve '{host}': {reason}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,

        /// Details about the resolution failure.
        reason: String,
    },

    /// The client was closed before the metric could be sent.
    #[error("client is closed")]
    Closed,
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self {
        SendError::Io(Arc::new(e))
    }
}

/// Outcome of a send: the number of bytes written, or the error that occurred.
///
/// A metric that was skipped by sampling, or that was sent by a mock client, completes successfully with zero bytes.
pub type SendResult = Result<usize, SendError>;

/// Completion callback invoked exactly once with the outcome of a send.
pub type Callback = Box<dyn FnOnce(SendResult) + Send + 'static>;

/// A callback owned by the forwarder until its send has an outcome.
///
/// If it is dropped without being completed, such as when it was still queued behind a close, it completes with
/// [`SendError::Closed`]. Panics raised by the callback are caught and logged, so that they cannot take down the
/// forwarder thread, or prevent the other callbacks of a batch from being invoked.
pub(crate) struct PendingCallback(Option<Callback>);

impl PendingCallback {
    pub fn new(callback: Callback) -> Self {
        Self(Some(callback))
    }

    /// Invokes the callback with the outcome of the send.
    pub fn complete(mut self, result: SendResult) {
        self.invoke(result);
    }

    fn invoke(&mut self, result: SendResult) {
        if let Some(callback) = self.0.take() {
            if panic::catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
                error!("Completion callback panicked.");
            }
        }
    }
}

impl From<Callback> for PendingCallback {
    fn from(callback: Callback) -> Self {
        Self::new(callback)
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        self.invoke(Err(SendError::Closed));
    }
}

/// Handle to the outcome of a send.
///
/// Dropping the handle does not cancel the send.
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<SendResult>,
}

impl Completion {
    /// Creates a connected callback/handle pair.
    pub(crate) fn pair() -> (Callback, Completion) {
        let (tx, rx) = bounded(1);
        let callback: Callback = Box::new(move |result| {
            // The handle may have been dropped already, which is fine.
            let _ = tx.send(result);
        });

        (callback, Completion { rx })
    }

    /// Blocks until the send has completed, returning its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error the send completed with.
    pub fn wait(self) -> SendResult {
        self.rx.recv().unwrap_or(Err(SendError::Closed))
    }

    /// Blocks until the send has completed or the timeout elapses.
    ///
    /// Returns `None` if the send has not completed within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SendResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(SendError::Closed)),
        }
    }

    /// Returns the outcome of the send if it has already completed.
    pub fn try_result(&self) -> Option<SendResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SendError::Closed)),
        }
    }
}

/// Aggregates the outcomes of several sends into a single callback.
///
/// The callback fires exactly once: with the first error reported, or with the sum of bytes written once every send
/// has succeeded. Later outcomes are discarded once the callback has fired.
pub(crate) struct FanOut {
    remaining: AtomicUsize,
    bytes: AtomicUsize,
    callback: Mutex<Option<Callback>>,
}

impl FanOut {
    pub fn new(count: usize, callback: Callback) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            bytes: AtomicUsize::new(0),
            callback: Mutex::new(Some(callback)),
        })
    }

    /// Creates the callback for one of the aggregated sends.
    pub fn member(self: &Arc<Self>) -> Callback {
        let fan_out = Arc::clone(self);
        Box::new(move |result| fan_out.complete_one(result))
    }

    fn complete_one(&self, result: SendResult) {
        match result {
            Ok(bytes) => {
                self.bytes.fetch_add(bytes, AcqRel);
                if self.remaining.fetch_sub(1, AcqRel) == 1 {
                    let total = self.bytes.load(Acquire);
                    self.fire(Ok(total));
                }
            }
            Err(e) => {
                self.remaining.fetch_sub(1, AcqRel);
                self.fire(Err(e));
            }
        }
    }

    fn fire(&self, result: SendResult) {
        let maybe_callback = self.callback.lock().take();
        if let Some(callback) = maybe_callback {
            callback(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, time::Duration};

    use super::{Callback, Completion, FanOut, PendingCallback, SendError};

    #[test]
    fn completion_receives_result() {
        let (callback, completion) = Completion::pair();
        assert!(completion.try_result().is_none());

        callback(Ok(12));
        assert_eq!(completion.wait().unwrap(), 12);
    }

    #[test]
    fn completion_times_out_when_pending() {
        let (_callback, completion) = Completion::pair();
        assert!(completion.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn fan_out_sums_bytes() {
        let (callback, completion) = Completion::pair();
        let fan_out = FanOut::new(3, callback);

        let members = (0..3).map(|_| fan_out.member()).collect::<Vec<_>>();
        for (member, bytes) in members.into_iter().zip([5, 7, 9]) {
            assert!(completion.try_result().is_none());
            member(Ok(bytes));
        }

        assert_eq!(completion.wait().unwrap(), 21);
    }

    #[test]
    fn fan_out_sums_bytes_across_threads() {
        let (callback, completion) = Completion::pair();
        let fan_out = FanOut::new(8, callback);

        let handles = (0..8)
            .map(|i| {
                let member = fan_out.member();
                std::thread::spawn(move || member(Ok(i + 1)))
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(completion.wait().unwrap(), 36);
    }

    #[test]
    fn fan_out_reports_first_error_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let fan_out = FanOut::new(3, Box::new(move |result| tx.send(result).unwrap()));

        let a = fan_out.member();
        let b = fan_out.member();
        let c = fan_out.member();

        a(Ok(4));
        b(Err(SendError::from(io::Error::new(io::ErrorKind::Other, "boom"))));
        c(Err(SendError::Closed));
        drop(fan_out);

        let results = rx.iter().collect::<Vec<_>>();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Err(SendError::Io(e)) if e.to_string() == "boom"));
    }

    #[test]
    fn dropped_pending_callback_completes_as_closed() {
        let (callback, completion) = Completion::pair();
        drop(PendingCallback::new(callback));
        assert!(matches!(completion.try_result(), Some(Err(SendError::Closed))));
    }

    #[test]
    fn pending_callback_completes_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let callback: Callback = Box::new(move |result| tx.send(result).unwrap());
        PendingCallback::new(callback).complete(Ok(9));

        let results = rx.iter().collect::<Vec<_>>();
        assert_eq!(results.len(), 1);
        assert_eq!(*results[0].as_ref().unwrap(), 9);
    }

    #[test]
    fn pending_callback_contains_panics() {
        let callback: Callback = Box::new(|_| panic!("callback failure"));
        PendingCallback::new(callback).complete(Ok(1));

        let callback: Callback = Box::new(|_| panic!("callback failure"));
        drop(PendingCallback::new(callback));
    }
}
