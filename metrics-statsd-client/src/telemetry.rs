use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Client telemetry.
///
/// `Telemetry` collects information about the client's behavior: how many payloads and bytes were written or dropped,
/// how many occurrences were skipped by sampling, and how often the private socket was opened and closed.
#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_dropped: AtomicU64,
    samples_skipped: AtomicU64,
    sockets_opened: AtomicU64,
    sockets_closed: AtomicU64,
}

impl Telemetry {
    /// Tracks a successful packet send.
    pub fn track_packet_send_succeeded(&self, bytes_len: usize) {
        self.packets_sent.fetch_add(1, Relaxed);
        self.bytes_sent.fetch_add(bytes_len as u64, Relaxed);
    }

    /// Tracks a failed packet send.
    pub fn track_packet_send_failed(&self, bytes_len: usize) {
        self.packets_dropped.fetch_add(1, Relaxed);
        self.bytes_dropped.fetch_add(bytes_len as u64, Relaxed);
    }

    /// Tracks an occurrence that was not selected by sampling.
    pub fn track_sample_skipped(&self) {
        self.samples_skipped.fetch_add(1, Relaxed);
    }

    /// Tracks the creation of a private socket.
    pub fn track_socket_opened(&self) {
        self.sockets_opened.fetch_add(1, Relaxed);
    }

    /// Tracks the teardown of a private socket.
    pub fn track_socket_closed(&self) {
        self.sockets_closed.fetch_add(1, Relaxed);
    }

    /// Takes a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> ClientStats {
        ClientStats {
            packets_sent: self.packets_sent.load(Relaxed),
            packets_dropped: self.packets_dropped.load(Relaxed),
            bytes_sent: self.bytes_sent.load(Relaxed),
            bytes_dropped: self.bytes_dropped.load(Relaxed),
            samples_skipped: self.samples_skipped.load(Relaxed),
            sockets_opened: self.sockets_opened.load(Relaxed),
            sockets_closed: self.sockets_closed.load(Relaxed),
        }
    }
}

/// Snapshot of a client's internal counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Number of payloads written to the socket.
    pub packets_sent: u64,

    /// Number of payloads whose write failed.
    pub packets_dropped: u64,

    /// Number of bytes written to the socket.
    pub bytes_sent: u64,

    /// Number of bytes in payloads whose write failed.
    pub bytes_dropped: u64,

    /// Number of metric occurrences not selected by sampling.
    pub samples_skipped: u64,

    /// Number of private sockets created.
    pub sockets_opened: u64,

    /// Number of private sockets closed, either after going idle or when the client was closed.
    pub sockets_closed: u64,
}
