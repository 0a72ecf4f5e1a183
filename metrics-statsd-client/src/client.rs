use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
};

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    completion::{Callback, Completion, FanOut, PendingCallback, SendError, SendResult},
    encoder::Encoder,
    forwarder::Command,
    metric::{MetricSample, MetricType, MetricValue, Names},
    telemetry::{ClientStats, Telemetry},
};

pub(crate) enum Backend {
    /// No network I/O at all.
    Mock,

    /// Background forwarder thread.
    Forwarder { tx: Sender<Command>, thread_id: ThreadId, handle: Mutex<Option<JoinHandle<()>>> },
}

impl Backend {
    pub fn forwarder(tx: Sender<Command>, handle: JoinHandle<()>) -> Self {
        Backend::Forwarder { tx, thread_id: handle.thread().id(), handle: Mutex::new(Some(handle)) }
    }
}

struct Inner {
    encoder: Encoder,
    backend: Backend,
    telemetry: Arc<Telemetry>,
}

/// A StatsD client.
///
/// Every method returns immediately: lines are encoded on the calling thread and handed to a background forwarder,
/// which batches them (if enabled) and writes them to the socket. The outcome of each send is reported through a
/// [`Completion`] or a callback, never by blocking the caller.
///
/// Cloning the client is cheap, and all clones share the same forwarder. The forwarder is shut down either by
/// [`close`][StatsdClient::close], or when the last clone is dropped, in which case any pending batch is still
/// flushed.
#[derive(Clone)]
pub struct StatsdClient {
    inner: Arc<Inner>,
}

impl StatsdClient {
    pub(crate) fn new(encoder: Encoder, backend: Backend, telemetry: Arc<Telemetry>) -> Self {
        Self { inner: Arc::new(Inner { encoder, backend, telemetry }) }
    }

    /// Returns `true` if this client is a mock, which performs no network I/O.
    pub fn is_mock(&self) -> bool {
        matches!(self.inner.backend, Backend::Mock)
    }

    /// Returns the encoder used to render lines for this client.
    pub fn encoder(&self) -> &Encoder {
        &self.inner.encoder
    }

    /// Adds `delta` to a counter.
    pub fn counter<N, V>(&self, names: N, delta: V) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        self.metric(names, delta, MetricType::Counter)
    }

    /// Increments a counter by one.
    pub fn increment<N>(&self, names: N) -> MetricBuilder<'_>
    where
        N: Into<Names>,
    {
        self.counter(names, 1)
    }

    /// Subtracts `delta` from a counter.
    pub fn decrement<N, V>(&self, names: N, delta: V) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        self.counter(names, delta.into().negate())
    }

    /// Records a timing, in milliseconds.
    pub fn timer<N, V>(&self, names: N, value: V) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        self.metric(names, value, MetricType::Timer)
    }

    /// Sets a gauge.
    pub fn gauge<N, V>(&self, names: N, value: V) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        self.metric(names, value, MetricType::Gauge)
    }

    /// Adds a member to a set.
    pub fn set<N, V>(&self, names: N, value: V) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        self.metric(names, value, MetricType::Set)
    }

    /// Records a histogram value.
    pub fn histogram<N, V>(&self, names: N, value: V) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        self.metric(names, value, MetricType::Histogram)
    }

    /// Sends a metric of any type.
    pub fn metric<N, V>(&self, names: N, value: V, metric_type: MetricType) -> MetricBuilder<'_>
    where
        N: Into<Names>,
        V: Into<MetricValue>,
    {
        MetricBuilder {
            client: self,
            names: names.into(),
            value: value.into(),
            metric_type,
            sample_rate: None,
            tags: Vec::new(),
        }
    }

    /// Sends a pre-built sample, invoking `callback` exactly once with the outcome.
    pub fn send_sample<F>(&self, sample: &MetricSample, callback: F)
    where
        F: FnOnce(SendResult) + Send + 'static,
    {
        self.dispatch(sample, Box::new(callback));
    }

    /// Requests that any pending batch be written immediately.
    ///
    /// This does not wait for the write to happen.
    pub fn flush(&self) {
        if let Backend::Forwarder { tx, .. } = &self.inner.backend {
            let _ = tx.send(Command::Flush);
        }
    }

    /// Closes the client.
    ///
    /// Any pending batch is written before this method returns, and the private socket, if any, is released. A shared
    /// socket is never closed. The completions of the flushed metrics may fire before or after this method returns.
    ///
    /// Closing is idempotent, and applies to every clone of the client. Once closed, every further send completes
    /// immediately with [`SendError::Closed`]. Closing a mock client has no effect.
    ///
    /// When called from within a completion callback, the close is requested but not waited for, since callbacks run
    /// on the forwarder itself.
    pub fn close(&self) {
        let Backend::Forwarder { tx, thread_id, handle } = &self.inner.backend else {
            return;
        };

        // The channel is already disconnected if the forwarder stopped, but it may still need joining.
        let (ack_tx, ack_rx) = bounded(1);
        let _ = tx.send(Command::Close { ack: ack_tx });

        if thread::current().id() == *thread_id {
            return;
        }

        let _ = ack_rx.recv();
        if let Some(handle) = handle.lock().take() {
            if handle.join().is_err() {
                debug!("Forwarder thread panicked.");
            }
        }
    }

    /// Returns a snapshot of the client's internal counters.
    pub fn stats(&self) -> ClientStats {
        self.inner.telemetry.snapshot()
    }

    fn dispatch(&self, sample: &MetricSample, callback: Callback) {
        let tx = match &self.inner.backend {
            Backend::Mock => return callback(Ok(0)),
            Backend::Forwarder { tx, .. } => tx,
        };

        let Some(message) = self.inner.encoder.encode(sample) else {
            self.inner.telemetry.track_sample_skipped();
            return callback(Ok(0));
        };

        let callback = PendingCallback::new(callback);
        if let Err(crossbeam_channel::SendError(Command::Write { callback, .. })) =
            tx.send(Command::Write { message, callback })
        {
            callback.complete(Err(SendError::Closed));
        }
    }
}

impl fmt::Debug for StatsdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdClient").field("mock", &self.is_mock()).finish_non_exhaustive()
    }
}

/// Builder for a single metric send.
///
/// Nothing is sent until [`send`][MetricBuilder::send] or [`send_with`][MetricBuilder::send_with] is called.
#[must_use = "metrics are not sent until `send` or `send_with` is called"]
pub struct MetricBuilder<'a> {
    client: &'a StatsdClient,
    names: Names,
    value: MetricValue,
    metric_type: MetricType,
    sample_rate: Option<f64>,
    tags: Vec<String>,
}

impl<'a> MetricBuilder<'a> {
    /// Sets the sample rate, the probability in `(0, 1]` that the metric is actually sent.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Adds a tag.
    pub fn with_tag<T>(mut self, tag: T) -> Self
    where
        T: Into<String>,
    {
        self.tags.push(tag.into());
        self
    }

    /// Adds several tags, preserving their order.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sends the metric, returning a handle to its outcome.
    ///
    /// The handle can be dropped for fire-and-forget use.
    pub fn send(self) -> Completion {
        let (callback, completion) = Completion::pair();
        self.send_callback(callback);
        completion
    }

    /// Sends the metric, invoking `callback` exactly once with the outcome.
    ///
    /// When several names were given, the callback receives the first error encountered, or the total number of bytes
    /// written once every name has been sent.
    pub fn send_with<F>(self, callback: F)
    where
        F: FnOnce(SendResult) + Send + 'static,
    {
        self.send_callback(Box::new(callback));
    }

    fn send_callback(self, callback: Callback) {
        let MetricBuilder { client, names, value, metric_type, sample_rate, tags } = self;
        let sample_for = |name: String| {
            let sample = MetricSample::new(name, value.clone(), metric_type).with_tags(tags.iter().cloned());
            match sample_rate {
                Some(rate) => sample.with_sample_rate(rate),
                None => sample,
            }
        };

        let mut names = names.into_vec();
        match names.len() {
            0 => callback(Ok(0)),
            1 => {
                let name = names.remove(0);
                client.dispatch(&sample_for(name), callback);
            }
            count => {
                let fan_out = FanOut::new(count, callback);
                for name in names {
                    client.dispatch(&sample_for(name), fan_out.member());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::{SocketAddr, UdpSocket},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use crate::{
        builder::StatsdBuilder,
        completion::{Completion, SendError},
        metric::{MetricSample, MetricType},
        transport::DatagramSocket,
    };

    use super::StatsdClient;

    const WAIT: Duration = Duration::from_secs(2);

    fn receiver() -> UdpSocket {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(WAIT)).unwrap();
        receiver
    }

    fn builder_for(receiver: &UdpSocket) -> StatsdBuilder {
        StatsdBuilder::default()
            .with_host("127.0.0.1")
            .with_port(receiver.local_addr().unwrap().port())
    }

    fn recv_string(receiver: &UdpSocket) -> String {
        let mut buf = [0; 2048];
        let len = receiver.recv(&mut buf).unwrap();
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    fn assert_nothing_received(receiver: &UdpSocket) {
        receiver.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0; 2048];
        assert!(receiver.recv(&mut buf).is_err());
    }

    #[test]
    fn metric_kinds() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();

        // Cases are defined as: send, expected line.
        let cases: [(Box<dyn Fn(&StatsdClient) -> Completion>, &str); 8] = [
            (Box::new(|c: &StatsdClient| c.counter("hits", 3).send()), "hits:3|c"),
            (Box::new(|c: &StatsdClient| c.increment("hits").send()), "hits:1|c"),
            (Box::new(|c: &StatsdClient| c.decrement("hits", 2).send()), "hits:-2|c"),
            (Box::new(|c: &StatsdClient| c.timer("latency", 250).send()), "latency:250|ms"),
            (Box::new(|c: &StatsdClient| c.timer("latency", Duration::from_millis(42)).send()), "latency:42|ms"),
            (Box::new(|c: &StatsdClient| c.gauge("depth", 2.5).send()), "depth:2.5|g"),
            (Box::new(|c: &StatsdClient| c.set("users", "u-1").send()), "users:u-1|s"),
            (
                Box::new(|c: &StatsdClient| c.histogram("size", 512).with_tag("route:home").send()),
                "size:512|h|#route:home",
            ),
        ];

        for (send, expected) in cases {
            let written = send(&client).wait_timeout(WAIT).unwrap().unwrap();
            assert_eq!(written, expected.len());
            assert_eq!(recv_string(&receiver), expected);
        }

        client.close();
    }

    #[test]
    fn prefix_suffix_and_global_tags() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_prefix("app.")
            .with_suffix(".web1")
            .with_global_tags(["b", "c"])
            .build()
            .unwrap();

        client.counter("foo", 1).with_tag("a").send().wait().unwrap();
        assert_eq!(recv_string(&receiver), "app.foo.web1:1|c|#a,b,c");

        client.close();
    }

    #[test]
    fn full_rate_always_writes() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();

        for _ in 0..20 {
            let completion = client.counter("foo", 1).with_sample_rate(1.0).send();
            assert_eq!(completion.wait().unwrap(), 7);
        }

        for _ in 0..20 {
            assert_eq!(recv_string(&receiver), "foo:1|c");
        }
        assert_eq!(client.stats().packets_sent, 20);

        client.close();
    }

    #[test]
    fn zero_rate_never_writes() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();

        for _ in 0..20 {
            // Skipped samples complete before `send` returns.
            let completion = client.counter("foo", 1).with_sample_rate(0.0).send();
            assert_eq!(completion.try_result().unwrap().unwrap(), 0);
        }

        let stats = client.stats();
        assert_eq!(stats.samples_skipped, 20);
        assert_eq!(stats.packets_sent, 0);
        assert_eq!(stats.sockets_opened, 0);

        client.close();
        assert_nothing_received(&receiver);
    }

    #[test]
    fn fan_out_sums_bytes() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let calls = Arc::clone(&calls);
            client.counter(["a", "b"], 1).send_with(move |result| {
                calls.fetch_add(1, Ordering::SeqCst);
                tx.send(result).unwrap();
            });
        }

        assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), 10);

        let mut lines = vec![recv_string(&receiver), recv_string(&receiver)];
        lines.sort();
        assert_eq!(lines, vec!["a:1|c", "b:1|c"]);

        client.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fan_out_empty_names_completes_immediately() {
        let client = StatsdBuilder::default().with_mock(true).build().unwrap();
        let completion = client.counter(Vec::<String>::new(), 1).send();
        assert_eq!(completion.try_result().unwrap().unwrap(), 0);
    }

    #[test]
    fn batching_coalesces_messages() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_batching(true)
            .with_max_batch_delay(Duration::from_secs(60))
            .build()
            .unwrap();

        let a = client.counter("a", 1).send();
        let b = client.counter("b", 2).send();
        client.flush();

        assert_eq!(a.wait().unwrap(), 11);
        assert_eq!(b.wait().unwrap(), 11);
        assert_eq!(recv_string(&receiver), "a:1|c\nb:2|c");
        assert_eq!(client.stats().packets_sent, 1);

        client.close();
    }

    #[test]
    fn batching_flushes_on_deadline() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_batching(true)
            .with_max_batch_delay(Duration::from_millis(50))
            .build()
            .unwrap();

        let completion = client.counter("a", 1).send();
        assert_eq!(completion.wait_timeout(WAIT).unwrap().unwrap(), 5);
        assert_eq!(recv_string(&receiver), "a:1|c");

        client.close();
    }

    #[test]
    fn batching_flushes_on_size() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_batching(true)
            .with_max_batch_length(11)
            .with_max_batch_delay(Duration::from_secs(60))
            .build()
            .unwrap();

        let a = client.counter("a", 1).send();
        let b = client.counter("b", 2).send();
        let c = client.counter("c", 3).send();

        // The first two messages fill the batch, so they are written without waiting for the deadline.
        assert_eq!(a.wait_timeout(WAIT).unwrap().unwrap(), 11);
        assert_eq!(b.wait_timeout(WAIT).unwrap().unwrap(), 11);
        assert_eq!(recv_string(&receiver), "a:1|c\nb:2|c");
        assert!(c.try_result().is_none());

        client.close();
        assert_eq!(c.wait().unwrap(), 5);
        assert_eq!(recv_string(&receiver), "c:3|c");
    }

    #[test]
    fn close_writes_pending_batch() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_batching(true)
            .with_max_batch_delay(Duration::from_secs(60))
            .build()
            .unwrap();

        let completion = client.counter("a", 1).send();
        client.counter("b", 2).send();
        client.close();

        // The write happened before `close` returned.
        assert_eq!(completion.try_result().unwrap().unwrap(), 11);
        assert_eq!(recv_string(&receiver), "a:1|c\nb:2|c");

        let stats = client.stats();
        assert_eq!(stats.sockets_opened, 1);
        assert_eq!(stats.sockets_closed, 1);
    }

    #[test]
    fn sends_after_close_fail() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();
        let clone = client.clone();

        client.close();
        client.close();

        let completion = clone.counter("a", 1).send();
        assert!(matches!(completion.try_result(), Some(Err(SendError::Closed))));
        assert_nothing_received(&receiver);
    }

    #[test]
    fn close_from_callback_does_not_deadlock() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = client.clone();
        client.counter("a", 1).send_with(move |_| {
            inner.close();
            tx.send(()).unwrap();
        });

        rx.recv_timeout(WAIT).unwrap();
        client.close();
        assert!(matches!(client.counter("a", 1).send().wait(), Err(SendError::Closed)));
    }

    #[test]
    fn send_queued_behind_close_completes_as_closed() {
        let receiver = receiver();
        let client = builder_for(&receiver).build().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        let inner = client.clone();
        {
            let calls = Arc::clone(&calls);
            client.counter("a", 1).send_with(move |_| {
                // Runs on the forwarder, so this send is queued behind the close.
                inner.close();
                inner.counter("b", 1).send_with(move |result| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tx.send(result).unwrap();
                });
            });
        }

        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), Err(SendError::Closed)));
        client.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_racing_sends_completes_every_callback() {
        const THREADS: usize = 4;
        const SENDS: usize = 200;

        let receiver = receiver();
        let client = builder_for(&receiver).with_batching(true).build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let senders = (0..THREADS)
            .map(|_| {
                let client = client.clone();
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    for _ in 0..SENDS {
                        let calls = Arc::clone(&calls);
                        client.increment("a").send_with(move |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect::<Vec<_>>();

        client.close();
        for sender in senders {
            sender.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), THREADS * SENDS);
    }

    #[test]
    fn fan_out_reports_first_error() {
        // Fails every payload for the metric named `b`.
        struct RejectingSocket(UdpSocket);

        impl DatagramSocket for RejectingSocket {
            fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
                if buf.starts_with(b"b:") {
                    return Err(io::Error::new(io::ErrorKind::Other, "rejected"));
                }
                self.0.send_to(buf, addr)
            }
        }

        let receiver = receiver();
        let socket = RejectingSocket(UdpSocket::bind("127.0.0.1:0").unwrap());
        let client = builder_for(&receiver).with_shared_socket(Arc::new(socket)).build().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let calls = Arc::clone(&calls);
            client.counter(["a", "b", "c"], 1).send_with(move |result| {
                calls.fetch_add(1, Ordering::SeqCst);
                tx.send(result).unwrap();
            });
        }

        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), Err(SendError::Io(e)) if e.to_string() == "rejected"));
        assert_eq!(recv_string(&receiver), "a:1|c");
        assert_eq!(recv_string(&receiver), "c:1|c");

        client.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().packets_dropped, 1);
    }

    #[test]
    fn partial_rate_writes_annotated_lines() {
        let receiver = receiver();
        let client = builder_for(&receiver).with_sampling_seed(7).build().unwrap();

        let mut written = 0;
        for _ in 0..200 {
            match client.counter("foo", 1).with_sample_rate(0.5).send().wait().unwrap() {
                0 => {}
                bytes => {
                    assert_eq!(bytes, 12);
                    assert_eq!(recv_string(&receiver), "foo:1|c|@0.5");
                    written += 1;
                }
            }
        }

        // Roughly half of the sends make it to the wire, and every one of them carries the rate.
        assert!((50..150).contains(&written), "written = {}", written);

        let stats = client.stats();
        assert_eq!(stats.packets_sent, written);
        assert_eq!(stats.samples_skipped, 200 - written);

        client.close();
        assert_nothing_received(&receiver);
    }

    #[test]
    fn dropping_last_clone_flushes() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_batching(true)
            .with_max_batch_delay(Duration::from_secs(60))
            .build()
            .unwrap();

        let completion = client.counter("a", 1).send();
        drop(client);

        assert_eq!(completion.wait_timeout(WAIT).unwrap().unwrap(), 5);
        assert_eq!(recv_string(&receiver), "a:1|c");
    }

    #[test]
    fn shared_socket_survives_close() {
        let receiver = receiver();
        let shared = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let client = builder_for(&receiver)
            .with_shared_socket(Arc::clone(&shared) as Arc<dyn DatagramSocket>)
            .with_batching(true)
            .build()
            .unwrap();

        client.counter("a", 1).send();
        client.close();
        assert_eq!(recv_string(&receiver), "a:1|c");

        // The injected socket is still open and usable by its owner.
        shared.send_to(b"b:1|c", receiver.local_addr().unwrap()).unwrap();
        assert_eq!(recv_string(&receiver), "b:1|c");

        let stats = client.stats();
        assert_eq!(stats.sockets_opened, 0);
        assert_eq!(stats.sockets_closed, 0);
    }

    #[test]
    fn idle_socket_recreated_on_next_send() {
        let receiver = receiver();
        let client = builder_for(&receiver).with_idle_timeout(Duration::from_millis(20)).build().unwrap();

        client.counter("a", 1).send().wait().unwrap();
        assert_eq!(recv_string(&receiver), "a:1|c");

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(client.stats().sockets_closed, 1);

        client.counter("b", 1).send().wait().unwrap();
        assert_eq!(recv_string(&receiver), "b:1|c");

        let stats = client.stats();
        assert_eq!(stats.sockets_opened, 2);
        assert_eq!(stats.packets_dropped, 0);

        client.close();
    }

    #[test]
    fn mock_client_never_touches_network() {
        let receiver = receiver();
        let client = builder_for(&receiver).with_mock(true).with_batching(true).build().unwrap();
        assert!(client.is_mock());

        let completion = client.counter(["a", "b"], 1).send();
        assert_eq!(completion.try_result().unwrap().unwrap(), 0);

        let (tx, rx) = crossbeam_channel::bounded(1);
        client.send_sample(&MetricSample::new("c", 1, MetricType::Gauge), move |result| {
            tx.send(result).unwrap();
        });
        assert_eq!(rx.try_recv().unwrap().unwrap(), 0);

        client.close();
        assert_eq!(client.stats().sockets_opened, 0);
        assert_nothing_received(&receiver);
    }

    #[test]
    fn write_errors_reach_every_batched_callback() {
        let receiver = receiver();
        let client = builder_for(&receiver)
            .with_batching(true)
            .with_max_batch_length(100_000)
            .with_max_batch_delay(Duration::from_secs(60))
            .build()
            .unwrap();

        let big = "x".repeat(40_000);
        let a = client.set("a", big.as_str()).send();
        let b = client.set("b", big.as_str()).send();
        client.flush();

        assert!(matches!(a.wait_timeout(WAIT).unwrap(), Err(SendError::Io(_))));
        assert!(matches!(b.wait_timeout(WAIT).unwrap(), Err(SendError::Io(_))));
        assert_eq!(client.stats().packets_dropped, 1);

        client.close();
    }
}
