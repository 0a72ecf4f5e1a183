//! A non-blocking client for sending metrics to a [StatsD][statsd]-compatible server, including the tag extension used
//! by [DogStatsD][dsd].
//!
//! [statsd]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md
//! [dsd]: https://docs.datadoghq.com/developers/dogstatsd/
//!
//! # Usage
//!
//! ```no_run
//! # use metrics_statsd_client::StatsdBuilder;
//! // First, create a builder.
//! //
//! // The builder can configure the remote server, a prefix or suffix for every metric name, tags added to every
//! // metric, batching, and more.
//! let client = StatsdBuilder::default()
//!     .with_host("localhost")
//!     .with_port(8125)
//!     .with_prefix("myapp.")
//!     .with_global_tag("env:prod")
//!     .build()
//!     .expect("failed to build client");
//!
//! // Sends return immediately. The returned handle can be dropped for fire-and-forget use...
//! let _ = client.increment("requests").with_tag("route:home").send();
//!
//! // ...or waited on to learn the outcome of the write.
//! let written = client.timer("latency", 42).send().wait();
//!
//! // Callbacks are supported too, and are invoked exactly once.
//! client.gauge("queue.depth", 12).with_sample_rate(0.5).send_with(|result| {
//!     if let Err(e) = result {
//!         eprintln!("failed to send gauge: {}", e);
//!     }
//! });
//!
//! // Closing flushes any pending batch and releases the socket.
//! client.close();
//! ```
//!
//! The client can also be used as the global recorder for the [`metrics`] macros:
//!
//! ```no_run
//! # use metrics_statsd_client::StatsdBuilder;
//! StatsdBuilder::default()
//!     .with_prefix("myapp.")
//!     .install_recorder()
//!     .expect("failed to install recorder");
//!
//! metrics::counter!("requests", "route" => "home").increment(1);
//! ```
//!
//! # Features
//!
//! ## Sampling
//!
//! Each metric can carry a sample rate. A metric whose rate is below one is only sent with that probability, and its
//! line is annotated with the rate so that the server can scale it back up.
//!
//! ## Batching
//!
//! When enabled, lines are coalesced into newline-delimited payloads, up to a maximum length. A payload is written once
//! it is full, or once a maximum delay has elapsed since its first line was added, whichever happens first.
//!
//! ## Ephemeral sockets
//!
//! Unless a shared socket is provided, the client creates its own socket on first use and closes it after a period of
//! inactivity, recreating it transparently on the next send. The remote host is resolved on each write, unless DNS
//! caching is enabled.
//!
//! ## Telemetry
//!
//! The client keeps internal counters of payloads and bytes sent or dropped, samples skipped, and sockets opened or
//! closed, available through [`StatsdClient::stats`].
//!
//! # Missing
//!
//! ## Unix domain sockets
//!
//! Only UDP is supported. Another datagram transport can be plugged in through [`DatagramSocket`] and
//! [`StatsdBuilder::with_shared_socket`].

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{global_client, BuildError, StatsdBuilder};

mod client;
pub use self::client::{MetricBuilder, StatsdClient};

mod completion;
pub use self::completion::{Callback, Completion, SendError, SendResult};

mod encoder;
pub use self::encoder::Encoder;

mod forwarder;

mod metric;
pub use self::metric::{MetricSample, MetricType, MetricValue, Names};

mod recorder;
pub use self::recorder::StatsdRecorder;

mod sampler;

mod telemetry;
pub use self::telemetry::ClientStats;

mod transport;
pub use self::transport::{DatagramSocket, Resolver, SystemResolver};

mod writer;
