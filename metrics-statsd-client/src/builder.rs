use std::{sync::Arc, time::Duration};

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::{
    client::{Backend, StatsdClient},
    encoder::Encoder,
    forwarder::{self, BatchConfiguration, ForwarderConfiguration},
    recorder::StatsdRecorder,
    sampler::Sampler,
    telemetry::Telemetry,
    transport::{DatagramSocket, RemoteAddr, Resolver, SystemResolver},
    writer::SMALLEST_VALID_PAYLOAD,
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8125;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_BATCH_LENGTH: usize = 1500;
const DEFAULT_MAX_BATCH_DELAY: Duration = Duration::from_millis(1000);

static GLOBAL_CLIENT: OnceCell<StatsdClient> = OnceCell::new();

/// Returns the client registered with [`StatsdBuilder::install`], if any.
pub fn global_client() -> Option<&'static StatsdClient> {
    GLOBAL_CLIENT.get()
}

/// Errors that could occur while building or installing a StatsD client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to resolve the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the resolution failure.
        reason: String,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Details about the invalid setting.
        reason: String,
    },

    /// Failed to spawn the background forwarder thread.
    #[error("failed to spawn background thread for client")]
    Backend,

    /// Failed to install the client, or its recorder, because one is already installed.
    #[error("failed to install client globally")]
    FailedToInstall,
}

/// Builder for a StatsD client.
pub struct StatsdBuilder {
    host: String,
    port: u16,
    prefix: String,
    suffix: String,
    global_tags: Vec<String>,
    mock: bool,
    batching: bool,
    max_batch_len: usize,
    max_batch_delay: Duration,
    cache_dns: bool,
    shared_socket: Option<Arc<dyn DatagramSocket>>,
    resolver: Arc<dyn Resolver>,
    idle_timeout: Duration,
    write_timeout: Duration,
    sampling_seed: Option<u64>,
}

impl StatsdBuilder {
    /// Set the host to send metrics to.
    ///
    /// Defaults to `localhost`.
    #[must_use]
    pub fn with_host<H>(mut self, host: H) -> Self
    where
        H: Into<String>,
    {
        self.host = host.into();
        self
    }

    /// Set the port to send metrics to.
    ///
    /// Defaults to 8125.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the prefix prepended to every metric name.
    ///
    /// The prefix is used as-is, so it should usually end with a separator, such as `myapp.`.
    #[must_use]
    pub fn with_prefix<P>(mut self, prefix: P) -> Self
    where
        P: Into<String>,
    {
        self.prefix = prefix.into();
        self
    }

    /// Set the suffix appended to every metric name.
    #[must_use]
    pub fn with_suffix<S>(mut self, suffix: S) -> Self
    where
        S: Into<String>,
    {
        self.suffix = suffix.into();
        self
    }

    /// Set the global tags, which are appended after the call-specific tags of every metric.
    ///
    /// Replaces any global tags set previously.
    #[must_use]
    pub fn with_global_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.global_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single global tag.
    #[must_use]
    pub fn with_global_tag<T>(mut self, tag: T) -> Self
    where
        T: Into<String>,
    {
        self.global_tags.push(tag.into());
        self
    }

    /// Sets whether or not the client is a mock.
    ///
    /// A mock client performs no network I/O: no socket is created and no background thread is spawned. Every send
    /// completes immediately with zero bytes written.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    /// Sets whether or not to batch metrics.
    ///
    /// When enabled, metrics are coalesced into newline-delimited payloads, which are written once they reach the
    /// maximum batch length or the maximum batch delay has elapsed since the first metric of the batch. When
    /// disabled, every metric is written as soon as possible in its own payload.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_batching(mut self, batching: bool) -> Self {
        self.batching = batching;
        self
    }

    /// Set the maximum length of a batched payload.
    ///
    /// This should generally stay below the MTU of the path to the remote server, since oversized datagrams are
    /// fragmented or dropped. A single metric longer than this is still sent, in a payload of its own.
    ///
    /// Defaults to 1500 bytes.
    #[must_use]
    pub fn with_max_batch_length(mut self, max_batch_len: usize) -> Self {
        self.max_batch_len = max_batch_len;
        self
    }

    /// Set the maximum delay between the first metric of a batch being added and the batch being written.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_max_batch_delay(mut self, max_batch_delay: Duration) -> Self {
        self.max_batch_delay = max_batch_delay;
        self
    }

    /// Sets whether or not to resolve the host once, when the client is built.
    ///
    /// When enabled, a host that cannot be resolved fails the build. Otherwise, the host is resolved every time a
    /// payload is written, and resolution failures are reported to the affected sends.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_cache_dns(mut self, cache_dns: bool) -> Self {
        self.cache_dns = cache_dns;
        self
    }

    /// Set a shared socket to send metrics through.
    ///
    /// The socket is used for the whole lifetime of the client, and is never closed by it: it remains owned by the
    /// caller. Without a shared socket, the client creates its own socket on demand.
    #[must_use]
    pub fn with_shared_socket(mut self, socket: Arc<dyn DatagramSocket>) -> Self {
        self.shared_socket = Some(socket);
        self
    }

    /// Set the resolver used to turn the host into a socket address.
    ///
    /// Defaults to [`SystemResolver`].
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set how long the client's own socket may stay unused before it is closed.
    ///
    /// The socket is transparently recreated on the next send.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the write timeout for the client's own socket.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Set a fixed seed for sampling decisions.
    ///
    /// Mostly useful for deterministic tests. By default, the sampler is seeded from the thread-local random number
    /// generator.
    #[must_use]
    pub fn with_sampling_seed(mut self, seed: u64) -> Self {
        self.sampling_seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.max_batch_len < SMALLEST_VALID_PAYLOAD.len() {
            return Err(BuildError::InvalidConfiguration {
                reason: format!(
                    "maximum batch length must be {} or greater (got {})",
                    SMALLEST_VALID_PAYLOAD.len(),
                    self.max_batch_len
                ),
            });
        }

        if self.write_timeout.is_zero() {
            return Err(BuildError::InvalidConfiguration {
                reason: "write timeout must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Builds the client.
    ///
    /// Unless the client is a mock, a background thread is spawned to write metrics to the remote server.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, if the host cannot be resolved while DNS caching is enabled, or if the
    /// background thread cannot be spawned, an error will be returned.
    pub fn build(self) -> Result<StatsdClient, BuildError> {
        self.validate()?;

        let sampler = match self.sampling_seed {
            Some(seed) => Sampler::with_seed(seed),
            None => Sampler::new(),
        };
        let encoder = Encoder::new(self.prefix, self.suffix, self.global_tags, sampler);
        let telemetry = Arc::new(Telemetry::default());

        if self.mock {
            return Ok(StatsdClient::new(encoder, Backend::Mock, telemetry));
        }

        let mut remote_addr = RemoteAddr::new(self.host, self.port, self.resolver);
        if self.cache_dns {
            remote_addr = remote_addr
                .resolve_eagerly()
                .map_err(|e| BuildError::InvalidRemoteAddress { reason: e.to_string() })?;
        }

        let forwarder_config = ForwarderConfiguration {
            remote_addr,
            shared_socket: self.shared_socket,
            batching: self.batching.then_some(BatchConfiguration {
                max_batch_len: self.max_batch_len,
                max_batch_delay: self.max_batch_delay,
            }),
            idle_timeout: self.idle_timeout,
            write_timeout: self.write_timeout,
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        let forwarder = forwarder::sync::Forwarder::new(forwarder_config, rx, Arc::clone(&telemetry));
        let handle = std::thread::Builder::new()
            .name("metrics-statsd-client-forwarder".to_string())
            .spawn(move || forwarder.run())
            .map_err(|_| BuildError::Backend)?;

        Ok(StatsdClient::new(encoder, Backend::forwarder(tx, handle), telemetry))
    }

    /// Builds the client and registers it globally.
    ///
    /// The registered client can be retrieved with [`global_client`]. A clone of it is returned as well.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, or if a client is already registered, an error will be returned.
    pub fn install(self) -> Result<StatsdClient, BuildError> {
        let client = self.build()?;
        GLOBAL_CLIENT.set(client.clone()).map_err(|_| BuildError::FailedToInstall)?;
        Ok(client)
    }

    /// Builds a [`metrics`] recorder backed by a new client.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, an error will be returned.
    pub fn build_recorder(self) -> Result<StatsdRecorder, BuildError> {
        self.build().map(StatsdRecorder::new)
    }

    /// Builds a [`metrics`] recorder backed by a new client, and installs it as the global recorder.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, or if a global recorder is already installed, an error will be returned.
    pub fn install_recorder(self) -> Result<(), BuildError> {
        let recorder = self.build_recorder()?;
        metrics::set_global_recorder(recorder).map_err(|_| BuildError::FailedToInstall)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            prefix: String::new(),
            suffix: String::new(),
            global_tags: Vec::new(),
            mock: false,
            batching: false,
            max_batch_len: DEFAULT_MAX_BATCH_LENGTH,
            max_batch_delay: DEFAULT_MAX_BATCH_DELAY,
            cache_dns: false,
            shared_socket: None,
            resolver: Arc::new(SystemResolver),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            sampling_seed: None,
        }
    }
}
